//! Error types for ingestion.
//!
//! Only run-level failures live here. Per-entry problems (a missing file, a
//! bad identifier) are counted in the summary and never abort a run.

use std::path::PathBuf;

use moldb_store::StoreError;
use thiserror::Error;

/// Errors that abort an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The mapping table could not be opened or read.
    #[error("cannot read mapping table {path}: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The mapping table's header lacks a required column.
    #[error("mapping table has no column named {0:?}")]
    MissingColumn(String),

    /// The content directory does not exist.
    #[error("content directory {0} does not exist")]
    ContentDir(PathBuf),

    /// The target store is unusable (unavailable, read-only).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// CSV decoding failed at the I/O level.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for ingestion.
pub type Result<T> = std::result::Result<T, IngestError>;
