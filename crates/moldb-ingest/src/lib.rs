//! # moldb Ingest
//!
//! Bulk builder for moldb stores. Reads a CSV mapping table of
//! `(source key, identifier)` rows, loads one content file per row from a
//! corpus directory, and writes the pairs in batches through any
//! [`RecordStore`](moldb_store::RecordStore).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use moldb_ingest::{IngestOptions, Ingestor};
//! use moldb_store::{open_store, Backend, StoreConfig};
//!
//! let store = open_store(&StoreConfig::new(Backend::Lmdb, "molecules.lmdb")).unwrap();
//! let summary = Ingestor::new(store.as_ref(), IngestOptions::new("data/xyz_files"))
//!     .run("data/inchi_mapping.csv")
//!     .unwrap();
//! println!("{summary}");
//! ```
//!
//! ## Failure Model
//!
//! - Missing or unreadable content files and invalid identifiers are
//!   **skipped** and counted; the run continues
//! - A failed batch is counted as **failed** (minus anything already
//!   committed); the run continues
//! - An unusable store, a missing content directory, or an unreadable
//!   mapping table aborts the run with [`IngestError`]

pub mod error;
pub mod ingestor;
pub mod mapping;
pub mod summary;

pub use error::{IngestError, Result};
pub use ingestor::{IngestOptions, Ingestor, DEFAULT_PROGRESS_INTERVAL};
pub use mapping::{MappingColumns, MappingReader, MappingRow};
pub use summary::{IngestSummary, Progress};
