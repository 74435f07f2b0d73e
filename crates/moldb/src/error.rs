//! Error types for the facade.

use std::path::PathBuf;

use moldb_core::InvalidKeyError;
use moldb_ingest::IngestError;
use moldb_store::{Backend, StoreError};
use thiserror::Error;

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum MoldbError {
    /// Identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidKey(#[from] InvalidKeyError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Ingestion error.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// The config file exists but cannot be read or parsed.
    #[error("invalid config file {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// The selected backend keeps nothing on disk.
    #[error("backend {0} does not persist records; use lmdb or sqlite")]
    EphemeralBackend(Backend),

    /// An environment override has a value of the wrong shape.
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, MoldbError>;
