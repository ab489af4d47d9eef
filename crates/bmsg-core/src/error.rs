//! Error types for bmsg-core

use thiserror::Error;

/// Main error type for bmsg-core
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input is malformed (empty URL, missing target, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced client, message or delivery record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Admin secret mismatch
    #[error("Authentication failed")]
    Auth,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Whether the error was caused by the caller rather than the server
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_) | Self::Auth)
    }
}

/// Result type alias for bmsg-core
pub type Result<T> = std::result::Result<T, Error>;
