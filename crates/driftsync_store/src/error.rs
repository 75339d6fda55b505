//! Error types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A snapshot or state file could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another process holds the lock on a store file.
    #[error("store is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// Insert of an id that already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Lookup of an id that does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A record failed its own validation.
    #[error("invalid record {id}: {reason}")]
    InvalidRecord {
        /// Record id.
        id: String,
        /// Validation message.
        reason: String,
    },

    /// Persisted data is unreadable.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A write was refused.
    #[error("write failed: {0}")]
    WriteFailed(String),
}
