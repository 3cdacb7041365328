//! Artifact errors

use thiserror::Error;

/// Errors that can occur while encoding or decoding artifacts
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Invalid magic bytes in a serialized artifact
    #[error("Invalid magic bytes")]
    InvalidMagic,

    /// Unsupported artifact version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),

    /// Unexpected end of input
    #[error("Unexpected end of data")]
    UnexpectedEnd,

    /// A packed binding payload could not be decoded
    #[error("Malformed binding payload: {0}")]
    MalformedPayload(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing an artifact stream failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for artifact operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
