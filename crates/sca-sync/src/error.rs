//! Error types for the sync engine.

use sca_core::AuthorizationKey;

/// Classified failure of one request against one connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The server no longer knows this connection.
    #[error("Connection not found")]
    ConnectionNotFound,

    /// The connection was revoked on the server side.
    #[error("Connection already revoked")]
    ConnectionRevoked,

    /// Any other transport or server failure.
    #[error("{0}")]
    Generic(String),
}

impl FetchError {
    /// Error class the server reports for an unknown connection.
    pub const NOT_FOUND_CLASS: &'static str = "ConnectionNotFound";
    /// Error class the server reports for a revoked connection.
    pub const REVOKED_CLASS: &'static str = "ConnectionAlreadyRevoked";

    /// Classify a server error response by its error class.
    pub fn from_error_class(error_class: &str, message: &str) -> Self {
        match error_class {
            Self::NOT_FOUND_CLASS => Self::ConnectionNotFound,
            Self::REVOKED_CLASS => Self::ConnectionRevoked,
            _ => Self::Generic(message.to_string()),
        }
    }
}

/// Errors from engine and dispatcher operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Authorization {0} not found")]
    RecordNotFound(AuthorizationKey),

    #[error("Authorization {0} is not awaiting an action")]
    NotActionable(AuthorizationKey),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Connection {0} is inactive or has no usable base URL")]
    UnusableConnection(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}
