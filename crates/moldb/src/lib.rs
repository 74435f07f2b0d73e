//! # moldb
//!
//! Persistent storage for molecular structure records keyed by chemical
//! identifier (typically an InChI string), with two interchangeable
//! on-disk engines and a bulk builder.
//!
//! ## Overview
//!
//! - **Identifiers**: validated, whitespace-normalized keys; URL-encoded
//!   forms are decoded by the key codec
//! - **Stores**: one blocking [`RecordStore`] contract, backed by LMDB
//!   (read-optimized, memory-mapped) or SQLite (embedded relational)
//! - **Ingestion**: a CSV mapping table plus one structure file per row,
//!   written in batches into either engine
//!
//! ## Usage
//!
//! ```rust,no_run
//! use moldb::{Ingestor, Settings};
//!
//! let settings = Settings::load("config.json").unwrap();
//! let store = settings.open_store(false).unwrap();
//!
//! let summary = Ingestor::new(store.as_ref(), settings.ingest_options())
//!     .run(&settings.inchi_mapping)
//!     .unwrap();
//! println!("{summary}");
//!
//! let water = moldb::decode("InChI%3D1S%2FH2O%2Fh1H2").unwrap();
//! if let Some(record) = store.get(&water).unwrap() {
//!     println!("{}", record.content_str().unwrap_or_default());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `moldb::core` - Identifiers, the key codec, records
//! - `moldb::store` - The `RecordStore` trait and its engines
//! - `moldb::ingest` - Mapping-table ingestion

pub mod error;
pub mod settings;

// Re-export component crates
pub use moldb_core as core;
pub use moldb_ingest as ingest;
pub use moldb_store as store;

pub use error::{MoldbError, Result};
pub use settings::Settings;

// Re-export commonly used types
pub use moldb_core::{decode, encode, normalize, Identifier, InvalidKeyError, Record};
pub use moldb_ingest::{IngestOptions, IngestSummary, Ingestor};
pub use moldb_store::{
    open_store, Backend, DeleteResult, RecordStore, RecordStoreExt, StoreConfig, StoreError,
};
