//! Error types for the store module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// A missing record is not an error: `get` returns `None` and `delete`
/// returns [`DeleteResult::NotFound`](crate::DeleteResult::NotFound).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing file cannot be opened or initialized. Fatal to the caller.
    #[error("store unavailable at {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Error from the LMDB environment.
    #[error("lmdb error: {0}")]
    Lmdb(#[from] heed::Error),

    /// The store was opened read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Stored bytes do not match the expected layout.
    #[error("incompatible data: {0}")]
    Incompatible(String),

    /// A `put_many` chunk failed after `committed` records were durably written.
    #[error("batch aborted after {committed} committed records: {source}")]
    BatchAborted {
        committed: usize,
        #[source]
        source: Box<StoreError>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::Unavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the store itself is gone, as opposed to one write failing.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Unavailable { .. } => true,
            StoreError::BatchAborted { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }

    /// Whether retrying further writes against this store is pointless.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Unavailable { .. } | StoreError::ReadOnly => true,
            StoreError::BatchAborted { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Records durably written before the failure, for batch writes.
    pub fn committed(&self) -> usize {
        match self {
            StoreError::BatchAborted { committed, .. } => *committed,
            _ => 0,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
