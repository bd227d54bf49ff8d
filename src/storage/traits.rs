//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the insert
    ///
    /// Callers treat this as non-fatal: the record already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl StorageError {
    /// Returns true for uniqueness conflicts
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::DuplicateKey(
                    message.clone().unwrap_or_else(|| "constraint violation".to_string()),
                )
            }
            _ => StorageError::Sqlite(err),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Write side of a storage connection, as used by the crawler
///
/// Each value is one session with the backend. The crawler never shares a
/// session between threads; sessions are handed out by the
/// [`ConnectionPool`](crate::storage::ConnectionPool), so implementations
/// only need to be `Send`.
pub trait Storage: Send {
    /// Persists the content fetched for `url`
    fn insert_content(&mut self, url: &str, content: &str) -> StorageResult<()>;

    /// Persists a link-graph edge recording that `from_url` references `to_url`
    ///
    /// Fails with [`StorageError::DuplicateKey`] when the edge already exists.
    fn insert_link(&mut self, from_url: &str, to_url: &str) -> StorageResult<()>;
}
