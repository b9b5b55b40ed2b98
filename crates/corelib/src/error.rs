//! Error types for the core library.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),
    /// Message violates a structural invariant
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    /// Meta could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors produced while decoding a packed meta buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer ended before the named field
    #[error("truncated meta: need {needed} bytes for {field}, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    /// Unknown enum tag
    #[error("invalid {field} tag {tag}")]
    InvalidTag { field: &'static str, tag: u8 },
    /// String field is not UTF-8
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
    /// Bytes left over after the last field
    #[error("{0} trailing bytes after meta")]
    TrailingBytes(usize),
}
