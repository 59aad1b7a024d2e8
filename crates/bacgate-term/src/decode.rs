use bytes::Buf;

use crate::{tag, Pid, Reference, Term, TermError, VERSION};

/// Deepest tuple/list nesting accepted
pub const MAX_DEPTH: usize = 64;

/// Decode a complete term; the input must hold exactly one versioned term
pub fn decode(bytes: &[u8]) -> Result<Term, TermError> {
    let mut reader = Reader { buf: bytes, depth: 0 };
    let version = reader.u8().map_err(|_| TermError::Empty)?;
    if version != VERSION {
        return Err(TermError::BadVersion(version));
    }
    let term = reader.term()?;
    if !reader.buf.is_empty() {
        return Err(TermError::TrailingBytes(reader.buf.len()));
    }
    Ok(term)
}

struct Reader<'a> {
    buf: &'a [u8],
    /// Containers currently open
    depth: usize,
}

impl<'a> Reader<'a> {
    fn need(&self, n: usize) -> Result<(), TermError> {
        if self.buf.remaining() < n {
            Err(TermError::Truncated)
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, TermError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, TermError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32, TermError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], TermError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn term(&mut self) -> Result<Term, TermError> {
        let t = self.u8()?;
        match t {
            tag::SMALL_INTEGER => Ok(Term::Integer(self.u8()?.into())),
            tag::INTEGER => {
                self.need(4)?;
                Ok(Term::Integer(self.buf.get_i32().into()))
            }
            tag::NEW_FLOAT => {
                self.need(8)?;
                Ok(Term::Float(self.buf.get_f64()))
            }
            tag::SMALL_BIG => {
                let n = self.u8()? as usize;
                self.big(n)
            }
            tag::LARGE_BIG => {
                let n = self.u32()? as usize;
                self.big(n)
            }
            tag::ATOM | tag::SMALL_ATOM | tag::ATOM_UTF8 | tag::SMALL_ATOM_UTF8 => {
                self.atom_body(t).map(Term::Atom)
            }
            tag::SMALL_TUPLE => {
                let arity = self.u8()? as usize;
                self.nested(|r| r.elements(arity)).map(Term::Tuple)
            }
            tag::LARGE_TUPLE => {
                let arity = self.u32()? as usize;
                self.nested(|r| r.elements(arity)).map(Term::Tuple)
            }
            tag::NIL => Ok(Term::nil()),
            tag::STRING => {
                let len = self.u16()? as usize;
                let chars = self.bytes(len)?;
                Ok(Term::List(chars.iter().map(|c| Term::Integer((*c).into())).collect()))
            }
            tag::LIST => {
                let len = self.u32()? as usize;
                self.nested(|r| {
                    let elements = r.elements(len)?;
                    match r.term()? {
                        Term::List(tail) if tail.is_empty() => Ok(Term::List(elements)),
                        tail => Ok(Term::ImproperList(elements, Box::new(tail))),
                    }
                })
            }
            tag::BINARY => {
                let len = self.u32()? as usize;
                Ok(Term::Binary(self.bytes(len)?.to_vec()))
            }
            tag::NEW_PID | tag::PID => {
                let node = self.atom()?;
                let id = self.u32()?;
                let serial = self.u32()?;
                let creation = if t == tag::NEW_PID { self.u32()? } else { self.u8()?.into() };
                Ok(Term::Pid(Pid { node, id, serial, creation }))
            }
            tag::NEWER_REFERENCE | tag::NEW_REFERENCE => {
                let len = self.u16()? as usize;
                let node = self.atom()?;
                let creation = if t == tag::NEWER_REFERENCE { self.u32()? } else { self.u8()?.into() };
                let mut ids = Vec::with_capacity(len.min(5));
                for _ in 0..len {
                    ids.push(self.u32()?);
                }
                Ok(Term::Reference(Reference { node, creation, ids }))
            }
            other => Err(TermError::UnsupportedTag(other)),
        }
    }

    /// Decode the contents of one container, bounding the nesting depth
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, TermError>) -> Result<T, TermError> {
        if self.depth >= MAX_DEPTH {
            return Err(TermError::TooDeep);
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn elements(&mut self, count: usize) -> Result<Vec<Term>, TermError> {
        // Every element takes at least one byte
        self.need(count)?;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            elements.push(self.term()?);
        }
        Ok(elements)
    }

    fn atom(&mut self) -> Result<String, TermError> {
        let t = self.u8()?;
        match t {
            tag::ATOM | tag::SMALL_ATOM | tag::ATOM_UTF8 | tag::SMALL_ATOM_UTF8 => self.atom_body(t),
            other => Err(TermError::UnsupportedTag(other)),
        }
    }

    fn atom_body(&mut self, t: u8) -> Result<String, TermError> {
        let len = match t {
            tag::SMALL_ATOM | tag::SMALL_ATOM_UTF8 => self.u8()? as usize,
            _ => self.u16()? as usize,
        };
        let raw = self.bytes(len)?;
        match t {
            // Latin-1 maps one byte to one code point
            tag::ATOM | tag::SMALL_ATOM => Ok(raw.iter().map(|b| char::from(*b)).collect()),
            _ => String::from_utf8(raw.to_vec()).map_err(|_| TermError::InvalidAtom),
        }
    }

    fn big(&mut self, n: usize) -> Result<Term, TermError> {
        let sign = self.u8()?;
        let digits = self.bytes(n)?;
        let mut magnitude: u64 = 0;
        for (i, digit) in digits.iter().enumerate() {
            if *digit == 0 {
                continue;
            }
            if i >= 8 {
                return Err(TermError::IntegerOverflow);
            }
            magnitude |= u64::from(*digit) << (8 * i);
        }
        let value = if sign == 0 {
            i64::try_from(magnitude).map_err(|_| TermError::IntegerOverflow)?
        } else if magnitude == 1 << 63 {
            i64::MIN
        } else {
            -i64::try_from(magnitude).map_err(|_| TermError::IntegerOverflow)?
        };
        Ok(Term::Integer(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_requires_version() {
        assert_eq!(decode(&[]), Err(TermError::Empty));
        assert_eq!(decode(&[130, 106]), Err(TermError::BadVersion(130)));
    }

    #[test]
    fn test_decode_truncated_binary() {
        // Binary header claims 10 bytes, only 3 follow
        let bytes = [131, 109, 0, 0, 0, 10, b'a', b'b', b'c'];
        assert_eq!(decode(&bytes), Err(TermError::Truncated));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        assert_eq!(decode(&[131, 106, 0]), Err(TermError::TrailingBytes(1)));
    }

    #[test]
    fn test_decode_string_ext_as_char_list() {
        let bytes = [131, 107, 0, 2, b'h', b'i'];
        assert_eq!(
            decode(&bytes).unwrap(),
            Term::List(vec![Term::Integer(104), Term::Integer(105)])
        );
    }

    #[test]
    fn test_decode_legacy_latin1_atom() {
        let bytes = [131, 100, 0, 4, b't', b'r', b'u', b'e'];
        assert_eq!(decode(&bytes).unwrap(), Term::atom("true"));
    }

    #[test]
    fn test_decode_negative_small_big() {
        let bytes = [131, 110, 5, 1, 0, 0, 0, 0, 1];
        assert_eq!(decode(&bytes).unwrap(), Term::Integer(-(1 << 32)));
    }

    #[test]
    fn test_decode_oversized_big() {
        let bytes = [131, 110, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(decode(&bytes), Err(TermError::IntegerOverflow));
    }

    #[test]
    fn test_decode_unsupported_map() {
        assert_eq!(decode(&[131, 116, 0, 0, 0, 0]), Err(TermError::UnsupportedTag(116)));
    }

    /// `depth` singleton lists wrapped around nil
    fn nested_lists(depth: usize) -> Vec<u8> {
        let mut bytes = vec![131];
        for _ in 0..depth {
            bytes.extend_from_slice(&[108, 0, 0, 0, 1]);
        }
        bytes.extend(std::iter::repeat_n(106, depth + 1));
        bytes
    }

    #[test]
    fn test_decode_nesting_at_limit() {
        let mut term = decode(&nested_lists(MAX_DEPTH)).unwrap();
        let mut depth = 0;
        while let Term::List(mut elements) = term {
            if elements.is_empty() {
                break;
            }
            term = elements.remove(0);
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH);
    }

    #[test]
    fn test_decode_rejects_deep_nesting() {
        assert_eq!(decode(&nested_lists(MAX_DEPTH + 1)), Err(TermError::TooDeep));
        // Large enough to exhaust the stack without the limit
        assert_eq!(decode(&nested_lists(1_000_000)), Err(TermError::TooDeep));

        let mut tuples = vec![131];
        for _ in 0..10_000 {
            tuples.extend_from_slice(&[104, 1]);
        }
        tuples.push(106);
        assert_eq!(decode(&tuples), Err(TermError::TooDeep));
    }

    #[test]
    fn test_decode_tuple_arity_beyond_input() {
        assert_eq!(decode(&[131, 104, 3, 106]), Err(TermError::Truncated));
    }
}
