//! Storage error taxonomy shared by every note-store backend
//!
//! `NotFound` is a recoverable condition distinct from engine failures so
//! callers can branch (404 at the edge vs 500).

use thiserror::Error;

/// Error type for note storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the given key
    #[error("note {0} does not exist")]
    NotFound(String),

    /// The operation did not complete within the configured bound
    #[error("storage operation timed out")]
    Timeout,

    /// Engine-level I/O failure
    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl StoreError {
    /// True when the error is the recoverable absent-record condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Storage(err.into())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Storage(err.into())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Storage(err.into())
    }
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;

/// Custom error type for database infrastructure
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] sqlx::Error),

    /// Error occurred during schema migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
