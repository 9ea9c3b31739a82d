//! Storage error types

use thiserror::Error;

/// Errors that can occur while reading or writing shared state
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Blocking store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Stored value out of range: {0}")]
    OutOfRange(i64),

    #[error("Id out of range: {0}")]
    IdRange(u64),
}
