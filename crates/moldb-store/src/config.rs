//! Store configuration and engine selection.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lmdb::LmdbStore;
use crate::sqlite::SqliteStore;
use crate::traits::RecordStore;

/// Records per `put_many` transaction.
///
/// Commit overhead dominates at multi-million record scale; this matches the
/// commit interval the reference builder used and has not been tuned further.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Initial LMDB map size: 30 GiB.
pub const DEFAULT_INITIAL_MAP_SIZE: usize = 30 * 1024 * 1024 * 1024;

/// Ceiling for LMDB map growth: 1 TiB.
pub const DEFAULT_MAX_MAP_SIZE: usize = 1024 * 1024 * 1024 * 1024;

/// LMDB reader slots / SQLite pooled read connections.
pub const DEFAULT_MAX_READERS: u32 = 126;

/// Which storage engine backs a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Memory-mapped, read-optimized (LMDB).
    Lmdb,
    /// Embedded relational (SQLite).
    Sqlite,
    /// In-process map with no persistence. `path` and `read_only` are
    /// ignored and everything is lost on drop; meant for tests.
    Memory,
}

impl Backend {
    /// Whether records survive the store being dropped.
    pub fn is_persistent(self) -> bool {
        !matches!(self, Backend::Memory)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Lmdb => "lmdb",
            Backend::Sqlite => "sqlite",
            Backend::Memory => "memory",
        })
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lmdb" => Ok(Backend::Lmdb),
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("unknown backend: {other} (expected lmdb or sqlite)")),
        }
    }
}

/// Configuration for opening a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,

    /// The single backing file.
    pub path: PathBuf,

    /// Records per `put_many` transaction.
    pub batch_size: usize,

    /// LMDB map size at open, in bytes. Grown on demand.
    pub initial_map_size: usize,

    /// LMDB map growth stops here; writes beyond it fail.
    pub max_map_size: usize,

    /// Open for serving only; writes return `StoreError::ReadOnly`.
    pub read_only: bool,

    /// Sync every commit to disk. Turning this off speeds up offline builds
    /// at the cost of losing recent commits on power loss.
    pub durable: bool,

    /// LMDB reader slots; also caps the SQLite read connections open at once.
    pub max_readers: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Lmdb,
            path: PathBuf::from("molecules.lmdb"),
            batch_size: DEFAULT_BATCH_SIZE,
            initial_map_size: DEFAULT_INITIAL_MAP_SIZE,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
            read_only: false,
            durable: true,
            max_readers: DEFAULT_MAX_READERS,
        }
    }
}

impl StoreConfig {
    /// A config for `backend` at `path`, with defaults otherwise.
    pub fn new(backend: Backend, path: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn initial_map_size(mut self, bytes: usize) -> Self {
        self.initial_map_size = bytes;
        self
    }

    pub fn max_map_size(mut self, bytes: usize) -> Self {
        self.max_map_size = bytes;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn max_readers(mut self, readers: u32) -> Self {
        self.max_readers = readers;
        self
    }
}

/// Open the engine named by `config.backend`.
///
/// Fails with `StoreError::Unavailable` if the file cannot be opened or was
/// written by something else. [`Backend::Memory`] always opens empty.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn RecordStore>> {
    let store: Box<dyn RecordStore> = match config.backend {
        Backend::Lmdb => Box::new(LmdbStore::open(config)?),
        Backend::Sqlite => Box::new(SqliteStore::open(config)?),
        Backend::Memory => Box::new(crate::memory::MemoryStore::new()),
    };
    tracing::info!(
        backend = %config.backend,
        path = %config.path.display(),
        read_only = config.read_only,
        "store opened"
    );
    Ok(store)
}
