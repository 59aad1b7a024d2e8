//! Erlang external term format
//!
//! Encoder and decoder for the subset of the external term format exchanged
//! with an Erlang port owner: atoms, integers (including small bignums),
//! floats, binaries, strings, proper and improper lists, tuples, pids and
//! references.

mod decode;
mod encode;
mod error;

pub use decode::decode;
pub use encode::{encode, encode_into};
pub use error::TermError;

/// Version byte that prefixes every encoded term
pub const VERSION: u8 = 131;

pub(crate) mod tag {
    pub const NEW_FLOAT: u8 = 70;
    pub const NEW_PID: u8 = 88;
    pub const NEWER_REFERENCE: u8 = 90;
    pub const SMALL_INTEGER: u8 = 97;
    pub const INTEGER: u8 = 98;
    pub const ATOM: u8 = 100;
    pub const PID: u8 = 103;
    pub const SMALL_TUPLE: u8 = 104;
    pub const LARGE_TUPLE: u8 = 105;
    pub const NIL: u8 = 106;
    pub const STRING: u8 = 107;
    pub const LIST: u8 = 108;
    pub const BINARY: u8 = 109;
    pub const SMALL_BIG: u8 = 110;
    pub const LARGE_BIG: u8 = 111;
    pub const NEW_REFERENCE: u8 = 114;
    pub const SMALL_ATOM: u8 = 115;
    pub const ATOM_UTF8: u8 = 118;
    pub const SMALL_ATOM_UTF8: u8 = 119;
}

/// A decoded term
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Atom(String),
    Integer(i64),
    Float(f64),
    Binary(Vec<u8>),
    /// Proper list; the empty list is `nil`
    List(Vec<Term>),
    /// List whose tail is not `nil`, e.g. `[alias | Ref]`
    ImproperList(Vec<Term>, Box<Term>),
    Tuple(Vec<Term>),
    Pid(Pid),
    Reference(Reference),
}

/// Process identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pid {
    pub node: String,
    pub id: u32,
    pub serial: u32,
    pub creation: u32,
}

/// Reference (also used as a process alias)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub node: String,
    pub creation: u32,
    pub ids: Vec<u32>,
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Self {
        Term::Atom(name.into())
    }

    pub fn tuple(elements: impl Into<Vec<Term>>) -> Self {
        Term::Tuple(elements.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Term::Binary(bytes.into())
    }

    pub fn nil() -> Self {
        Term::List(Vec::new())
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Term::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Term::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Term::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Term::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// `true` / `false` atoms
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_atom()? {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    pub fn is_atom(&self, name: &str) -> bool {
        self.as_atom() == Some(name)
    }
}

impl From<&str> for Term {
    fn from(name: &str) -> Self {
        Term::atom(name)
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Integer(n)
    }
}

impl From<u32> for Term {
    fn from(n: u32) -> Self {
        Term::Integer(n.into())
    }
}

impl From<f64> for Term {
    fn from(f: f64) -> Self {
        Term::Float(f)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::atom(if b { "true" } else { "false" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pid() -> Pid {
        Pid {
            node: "nonode@nohost".to_string(),
            id: 84,
            serial: 0,
            creation: 0,
        }
    }

    fn sample_ref() -> Reference {
        Reference {
            node: "nonode@nohost".to_string(),
            creation: 1_700_000_000,
            ids: vec![178_311, 2_910_453_761, 1_823_401_025],
        }
    }

    #[test]
    fn test_gen_call_envelope_roundtrip() {
        let from = Term::tuple(vec![
            Term::Pid(sample_pid()),
            Term::ImproperList(vec![Term::atom("alias")], Box::new(Term::Reference(sample_ref()))),
        ]);
        let envelope = Term::tuple(vec![
            Term::atom("$gen_call"),
            from,
            Term::tuple(vec![
                Term::atom("create_routed_analog_input"),
                Term::from(1000u32),
                Term::from(5u32),
                Term::binary("Zone Temp"),
                Term::atom("degrees_celsius"),
            ]),
        ]);

        let bytes = encode(&envelope);
        assert_eq!(bytes[0], VERSION);
        assert_eq!(decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_integer_widths() {
        for n in [0i64, 255, 256, -1, i32::MAX as i64, i32::MAX as i64 + 1, u32::MAX as i64, -(1 << 40)] {
            let term = Term::Integer(n);
            assert_eq!(decode(&encode(&term)).unwrap(), term, "value {}", n);
        }
    }

    #[test]
    fn test_bool_helpers() {
        assert_eq!(Term::from(true).as_bool(), Some(true));
        assert_eq!(Term::atom("reverse").as_bool(), None);
        assert!(Term::atom("ok").is_atom("ok"));
    }
}
