//! Common error types for ToxGuard

use thiserror::Error;

/// Common result type for ToxGuard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the ToxGuard crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store has no live connection (startup failure or shutdown in progress)
    #[error("Database not connected")]
    NotConnected,

    /// JSON encoding/decoding of stored documents
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
