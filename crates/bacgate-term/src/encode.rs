use bytes::{BufMut, BytesMut};

use crate::{tag, Pid, Reference, Term, VERSION};

/// Encode a term, version byte included
pub fn encode(term: &Term) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(64);
    encode_into(term, &mut buf);
    buf.to_vec()
}

/// Append the encoding of `term` (version byte included) to `buf`
pub fn encode_into(term: &Term, buf: &mut BytesMut) {
    buf.put_u8(VERSION);
    put_term(term, buf);
}

fn put_term(term: &Term, buf: &mut BytesMut) {
    match term {
        Term::Atom(name) => put_atom(name, buf),
        Term::Integer(n) => put_integer(*n, buf),
        Term::Float(f) => {
            buf.put_u8(tag::NEW_FLOAT);
            buf.put_f64(*f);
        }
        Term::Binary(bytes) => {
            buf.put_u8(tag::BINARY);
            buf.put_u32(bytes.len() as u32);
            buf.put_slice(bytes);
        }
        Term::List(elements) if elements.is_empty() => buf.put_u8(tag::NIL),
        Term::List(elements) => {
            put_list_header(elements.len(), buf);
            for element in elements {
                put_term(element, buf);
            }
            buf.put_u8(tag::NIL);
        }
        Term::ImproperList(elements, tail) => {
            put_list_header(elements.len(), buf);
            for element in elements {
                put_term(element, buf);
            }
            put_term(tail, buf);
        }
        Term::Tuple(elements) => {
            if elements.len() <= u8::MAX as usize {
                buf.put_u8(tag::SMALL_TUPLE);
                buf.put_u8(elements.len() as u8);
            } else {
                buf.put_u8(tag::LARGE_TUPLE);
                buf.put_u32(elements.len() as u32);
            }
            for element in elements {
                put_term(element, buf);
            }
        }
        Term::Pid(pid) => put_pid(pid, buf),
        Term::Reference(reference) => put_reference(reference, buf),
    }
}

fn put_list_header(len: usize, buf: &mut BytesMut) {
    buf.put_u8(tag::LIST);
    buf.put_u32(len as u32);
}

fn put_atom(name: &str, buf: &mut BytesMut) {
    let bytes = name.as_bytes();
    if bytes.len() <= u8::MAX as usize {
        buf.put_u8(tag::SMALL_ATOM_UTF8);
        buf.put_u8(bytes.len() as u8);
    } else {
        buf.put_u8(tag::ATOM_UTF8);
        buf.put_u16(bytes.len() as u16);
    }
    buf.put_slice(bytes);
}

fn put_integer(n: i64, buf: &mut BytesMut) {
    if (0..=u8::MAX as i64).contains(&n) {
        buf.put_u8(tag::SMALL_INTEGER);
        buf.put_u8(n as u8);
    } else if (i32::MIN as i64..=i32::MAX as i64).contains(&n) {
        buf.put_u8(tag::INTEGER);
        buf.put_i32(n as i32);
    } else {
        let mut magnitude = n.unsigned_abs();
        let mut digits = Vec::with_capacity(8);
        while magnitude > 0 {
            digits.push((magnitude & 0xFF) as u8);
            magnitude >>= 8;
        }
        buf.put_u8(tag::SMALL_BIG);
        buf.put_u8(digits.len() as u8);
        buf.put_u8(u8::from(n < 0));
        buf.put_slice(&digits);
    }
}

fn put_pid(pid: &Pid, buf: &mut BytesMut) {
    buf.put_u8(tag::NEW_PID);
    put_atom(&pid.node, buf);
    buf.put_u32(pid.id);
    buf.put_u32(pid.serial);
    buf.put_u32(pid.creation);
}

fn put_reference(reference: &Reference, buf: &mut BytesMut) {
    buf.put_u8(tag::NEWER_REFERENCE);
    buf.put_u16(reference.ids.len() as u16);
    put_atom(&reference.node, buf);
    buf.put_u32(reference.creation);
    for id in &reference.ids {
        buf.put_u32(*id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ok_atom() {
        assert_eq!(encode(&Term::atom("ok")), vec![131, 119, 2, b'o', b'k']);
    }

    #[test]
    fn test_encode_error_tuple() {
        let term = Term::tuple(vec![Term::atom("error"), Term::atom("bad_request")]);
        let bytes = encode(&term);
        assert_eq!(&bytes[..3], &[131, 104, 2]);
        assert_eq!(bytes.len(), 3 + (2 + 5) + (2 + 11));
    }

    #[test]
    fn test_encode_large_integer_as_small_big() {
        let bytes = encode(&Term::Integer(u32::MAX as i64));
        assert_eq!(bytes, vec![131, 110, 4, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_empty_list_is_nil() {
        assert_eq!(encode(&Term::nil()), vec![131, 106]);
    }
}
