/// Errors that can occur while decoding a term
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TermError {
    #[error("Empty input")]
    Empty,

    #[error("Unsupported format version: {0}")]
    BadVersion(u8),

    #[error("Unexpected end of input")]
    Truncated,

    #[error("Unsupported tag: {0}")]
    UnsupportedTag(u8),

    #[error("Integer does not fit in 64 bits")]
    IntegerOverflow,

    #[error("Atom is not valid UTF-8")]
    InvalidAtom,

    #[error("Term nested deeper than {} levels", crate::decode::MAX_DEPTH)]
    TooDeep,

    #[error("{0} trailing bytes after term")]
    TrailingBytes(usize),
}
