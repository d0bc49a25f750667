//! Error types for the line codec.
//!
//! Inbound framing problems are recovered from by dropping the offending
//! line; only outbound violations and transport failures surface as
//! [`CodecError`].

use std::io;

use thiserror::Error;

/// Line-level framing errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// A line exceeded the configured maximum length.
    #[error("line exceeds max length: {size} > {max}")]
    OversizedLine {
        /// Length of the offending line in bytes.
        size: usize,
        /// Maximum allowed line length.
        max: usize,
    },

    /// An outbound line contained a CR or LF byte.
    #[error("outbound line contains an embedded line break")]
    EmbeddedLineBreak,
}

/// Top-level codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing violation.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether the connection can keep running after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool { matches!(self, Self::Framing(_)) }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(inner) => inner,
            CodecError::Framing(framing) => io::Error::new(io::ErrorKind::InvalidData, framing),
        }
    }
}
