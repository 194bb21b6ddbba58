//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("local storage unavailable: {0}")]
    Unavailable(String),

    #[error("local storage quota exceeded: need {needed} of {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },
}
