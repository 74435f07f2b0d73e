//! # moldb Store
//!
//! Storage abstraction for moldb. Provides one blocking [`RecordStore`]
//! contract with two interchangeable on-disk engines and an in-memory
//! reference implementation.
//!
//! ## Key Types
//!
//! - [`RecordStore`] - The trait every engine implements
//! - [`LmdbStore`] - Memory-mapped, read-optimized (LMDB)
//! - [`SqliteStore`] - Embedded relational (SQLite)
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`StoreConfig`] / [`open_store`] - Engine selection at startup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use moldb_core::Identifier;
//! use moldb_store::{open_store, Backend, StoreConfig};
//!
//! let store = open_store(&StoreConfig::new(Backend::Lmdb, "molecules.lmdb")).unwrap();
//! let water = Identifier::new("InChI=1S/H2O/h1H2").unwrap();
//! store.put(&water, b"3\n\nO 0 0 0\nH 1 0 0\nH -1 0 0").unwrap();
//! let record = store.get(&water).unwrap();
//! ```
//!
//! ## Design Notes
//!
//! - **Last write wins**: `put` and `put_many` overwrite silently
//! - **Chunked batches**: `put_many` commits every `batch_size` records
//! - **Fail fast**: opening a missing, foreign, or newer-format file is
//!   `StoreError::Unavailable`, never an empty or misread store
//! - **Single writer**: one ingesting process per file; any number of readers

pub mod config;
pub mod error;
pub mod lmdb;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use config::{open_store, Backend, StoreConfig, DEFAULT_BATCH_SIZE};
pub use error::{Result, StoreError};
pub use lmdb::LmdbStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{DeleteResult, RecordStore, RecordStoreExt};
