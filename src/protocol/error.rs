//! Protocol error types.

use thiserror::Error;

/// Errors related to envelope encoding and framing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("envelope encoding failed: {0}")]
    Encode(String),

    #[error("envelope decoding failed: {0}")]
    Decode(String),

    #[error("unexpected service: expected {expected}, got {got}")]
    UnexpectedService { expected: String, got: String },

    #[error("frame too long: max {max}, got {got}")]
    FrameTooLong { max: usize, got: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True when the error came from the byte stream rather than from the
    /// content of a message.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}
