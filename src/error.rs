//! Centralized error handling for graphwire.
//!
//! Every failure the engines and the codec can produce is a variant of
//! [`GraphwireError`]. Nothing in the library panics on malformed input; the
//! crate is built with `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]`.
//!
//! ## Error Categories
//!
//! - **Corrupted Stream** ([`GraphwireError::CorruptedStream`]): premature end of a
//!   serialized stream, an unknown label byte, or any bounds violation in the
//!   compression codec.
//! - **Type Resolution** ([`GraphwireError::TypeResolution`]): a custom type name
//!   in the stream does not map to a registered type.
//! - **Cast** ([`GraphwireError::Cast`]): a stream value cannot be converted to the
//!   requested type without loss.
//! - **Construction** ([`GraphwireError::Construction`]): a record type cannot be
//!   instantiated without arguments.
//! - **Format** ([`GraphwireError::Format`]): the serializer was handed a value it
//!   cannot encode.
//! - **Compression** ([`GraphwireError::Compression`]): a general-purpose
//!   compressor failed or an unknown compressor id was requested.
//! - **I/O** ([`GraphwireError::Io`]): file helpers only; the engines never touch I/O.
//!
//! None of these are transient. Retrying with the same input and the same type
//! definitions fails the same way.
//!
//! ```rust
//! use graphwire::{GraphwireError, lzo};
//!
//! match lzo::decompress(&[0x01, 0x02]) {
//!     Err(GraphwireError::CorruptedStream(msg)) => eprintln!("bad payload: {msg}"),
//!     Err(e) => eprintln!("other failure: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for graphwire operations.
pub type Result<T> = std::result::Result<T, GraphwireError>;

/// The master error enum covering all failure domains.
///
/// The type is `Clone` so batch operations can collect and share failures.
/// I/O errors are wrapped in `Arc` to keep cloning cheap.
#[derive(Debug, Clone)]
pub enum GraphwireError {
    /// Low-level I/O failure raised by the file helpers.
    Io(Arc<io::Error>),

    /// The byte stream ended early or contains bytes that violate the format.
    ///
    /// Raised by the deserializer on end-of-stream and unknown labels, and by the
    /// LZO decompressor on any lookbehind, overrun or missing end marker.
    CorruptedStream(String),

    /// A custom type name read from the stream could not be resolved.
    TypeResolution(String),

    /// A value could not be converted between its stream type and the target type.
    ///
    /// Covers narrowing numeric conversions, null into a non-nullable target and
    /// casts between unrelated record types.
    Cast(String),

    /// A record type cannot be constructed without arguments.
    Construction(String),

    /// The serializer was asked to encode something it does not support.
    Format(String),

    /// A general-purpose compression backend failed.
    Compression(String),

    /// Logic error inside the engines. Seeing this indicates a bug.
    Internal(String),
}

impl GraphwireError {
    /// Shorthand used by the wire reader for truncated input.
    pub(crate) fn eof(what: &str) -> Self {
        Self::CorruptedStream(format!("unexpected end of stream while reading {what}"))
    }
}

impl fmt::Display for GraphwireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::CorruptedStream(s) => write!(f, "Corrupted Stream: {s}"),
            Self::TypeResolution(s) => write!(f, "Type Resolution Error: {s}"),
            Self::Cast(s) => write!(f, "Cast Error: {s}"),
            Self::Construction(s) => write!(f, "Construction Error: {s}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::Compression(s) => write!(f, "Compression Error: {s}"),
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for GraphwireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GraphwireError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_errors_keep_their_source() {
        let err: GraphwireError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("I/O Error"));
    }

    #[test]
    fn stream_errors_have_no_source() {
        let err = GraphwireError::eof("int32");
        assert!(err.source().is_none());
        assert_eq!(
            err.to_string(),
            "Corrupted Stream: unexpected end of stream while reading int32"
        );
    }
}
