//! Error types for the index.

use thiserror::Error;

/// Index operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Index errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite error (open, query, constraint)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (creating the database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored or supplied value cannot be represented
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Internal state is unusable (poisoned lock)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DbError {
    /// Create an invalid record error.
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
