//! Database error types.

use ripple_types::ValidationError;
use thiserror::Error;

/// An operation needed local state that is not there.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("no current user is stored")]
    CurrentUserDoesNotExist,

    #[error("message {0} does not exist")]
    MessageDoesNotExist(String),

    #[error("channel {0} does not exist")]
    ChannelDoesNotExist(String),
}

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Malformed identifier in a payload
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Required local state is missing
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// SQLite rejected the read or write
    #[error("SQLite error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// JSON column could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned: {0}")]
    LockPoisoned(String),
}

impl DatabaseError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
