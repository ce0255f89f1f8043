//! Common error types for the vault client.

use thiserror::Error;

/// Top-level error type shared by every service crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage backend failed to read, write or initialize.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request to the vault server failed.
    #[error("Network error: {0}")]
    Network(String),

    /// The server rejected the access token.
    #[error("Session expired")]
    SessionExpired,

    /// Key material is not available for this operation.
    #[error("Vault is locked")]
    Locked,

    /// No user is logged in.
    #[error("You are not logged in")]
    Unauthenticated,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
