//! Error types for the SCA core library.

use thiserror::Error;

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload did not match the expected wire shape
    #[error("Malformed payload: {0}")]
    Payload(String),

    /// Timestamp could not be parsed or formatted
    #[error("Timestamp error: {0}")]
    Timestamp(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
