//! Error types for the JSON codec

use thiserror::Error;

/// Result type alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding or decoding JSON
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl CodecError {
    /// Returns true if the error came from decoding input
    pub fn is_decode(&self) -> bool {
        matches!(self, CodecError::Deserialization(_))
    }
}
