//! Error types for smartnotes-core

use thiserror::Error;

/// Result type alias using smartnotes-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in smartnotes-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed intent, rejected before touching the store
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Operation on an unknown (or hidden) note id
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sign-in, token or session storage failure
    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),
}
