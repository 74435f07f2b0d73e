//! Application settings.
//!
//! Loaded in layers: built-in defaults, then an optional JSON file, then
//! `MOLECULES_*` environment variables. A missing file is fine; a file that
//! exists but does not parse is an error.

use std::io;
use std::path::{Path, PathBuf};

use moldb_ingest::{IngestOptions, MappingColumns};
use moldb_store::config::{DEFAULT_INITIAL_MAP_SIZE, DEFAULT_MAX_MAP_SIZE};
use moldb_store::{open_store, Backend, RecordStore, StoreConfig, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{MoldbError, Result};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Everything the binary needs to open a store and build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: Backend,
    pub lmdb_path: PathBuf,
    pub sqlite_path: PathBuf,
    pub batch_size: usize,
    /// Initial LMDB map size in bytes.
    pub map_size: usize,
    pub max_map_size: usize,
    pub durable: bool,
    /// Directory of structure files, one per source key.
    pub xyz_dir: PathBuf,
    pub extension: String,
    /// The CSV mapping table.
    pub inchi_mapping: PathBuf,
    pub inchikey_column: String,
    pub inchi_column: String,
}

impl Default for Settings {
    fn default() -> Self {
        let columns = MappingColumns::default();
        Self {
            backend: Backend::Lmdb,
            lmdb_path: PathBuf::from("molecules.lmdb"),
            sqlite_path: PathBuf::from("molecules.db"),
            batch_size: DEFAULT_BATCH_SIZE,
            map_size: DEFAULT_INITIAL_MAP_SIZE,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
            durable: true,
            xyz_dir: PathBuf::from("./data/xyz_files"),
            extension: "xyz".to_string(),
            inchi_mapping: PathBuf::from("inchi_mapping.csv"),
            inchikey_column: columns.source_key,
            inchi_column: columns.identifier,
        }
    }
}

impl Settings {
    /// Load from `config_path` (if it exists) and the process environment.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(config_path, |var| std::env::var(var).ok())
    }

    /// Like [`Settings::load`], reading environment variables through `env`.
    pub fn load_with<F>(config_path: impl AsRef<Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::from_file(config_path.as_ref())?.unwrap_or_default();
        settings.apply_env(env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would open a store but keep nothing.
    pub fn validate(&self) -> Result<()> {
        if !self.backend.is_persistent() {
            return Err(MoldbError::EphemeralBackend(self.backend));
        }
        Ok(())
    }

    /// Parse a JSON config file. `Ok(None)` if there is no such file.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MoldbError::Config {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        let settings = serde_json::from_str(&text).map_err(|e| MoldbError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(Some(settings))
    }

    /// Override fields from `MOLECULES_*` variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| env(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MOLECULES_BACKEND") {
            self.backend = v.parse().map_err(|_| MoldbError::Env {
                var: "MOLECULES_BACKEND",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("MOLECULES_LMDB_PATH") {
            self.lmdb_path = PathBuf::from(v);
        }
        if let Some(v) = get("MOLECULES_DB_PATH") {
            self.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = get("MOLECULES_BATCH_SIZE") {
            self.batch_size = parse_number("MOLECULES_BATCH_SIZE", v)?;
        }
        if let Some(v) = get("MOLECULES_MAP_SIZE") {
            self.map_size = parse_number("MOLECULES_MAP_SIZE", v)?;
        }
        if let Some(v) = get("MOLECULES_XYZ_DIR") {
            self.xyz_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MOLECULES_INCHI_MAPPING") {
            self.inchi_mapping = PathBuf::from(v);
        }
        if let Some(v) = get("MOLECULES_INCHIKEY_COLUMN") {
            self.inchikey_column = v;
        }
        if let Some(v) = get("MOLECULES_INCHI_COLUMN") {
            self.inchi_column = v;
        }
        Ok(())
    }

    /// The store file for the selected backend.
    pub fn store_path(&self) -> &Path {
        match self.backend {
            Backend::Sqlite => &self.sqlite_path,
            Backend::Lmdb | Backend::Memory => &self.lmdb_path,
        }
    }

    pub fn store_config(&self, read_only: bool) -> StoreConfig {
        StoreConfig::new(self.backend, self.store_path())
            .batch_size(self.batch_size)
            .initial_map_size(self.map_size)
            .max_map_size(self.max_map_size.max(self.map_size))
            .durable(self.durable)
            .read_only(read_only)
    }

    pub fn open_store(&self, read_only: bool) -> Result<Box<dyn RecordStore>> {
        self.validate()?;
        Ok(open_store(&self.store_config(read_only))?)
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions::new(&self.xyz_dir)
            .extension(self.extension.clone())
            .batch_size(self.batch_size)
            .columns(MappingColumns {
                source_key: self.inchikey_column.clone(),
                identifier: self.inchi_column.clone(),
            })
    }
}

fn parse_number(var: &'static str, value: String) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| MoldbError::Env { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_with(dir.path().join("config.json"), env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.store_path(), Path::new("molecules.lmdb"));
    }

    #[test]
    fn test_file_then_env_layering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"backend": "sqlite", "sqlite_path": "from_file.db", "batch_size": 500}"#,
        )
        .unwrap();

        let settings = Settings::load_with(
            &path,
            env(&[("MOLECULES_DB_PATH", "from_env.db"), ("MOLECULES_INCHI_COLUMN", "id")]),
        )
        .unwrap();

        assert_eq!(settings.backend, Backend::Sqlite);
        assert_eq!(settings.store_path(), Path::new("from_env.db"));
        assert_eq!(settings.batch_size, 500);
        assert_eq!(settings.ingest_options().columns.identifier, "id");
        assert_eq!(settings.ingest_options().columns.source_key, "inchikey");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Settings::load_with(&path, env(&[])).unwrap_err();
        assert!(matches!(err, MoldbError::Config { .. }));
    }

    #[test]
    fn test_bad_env_values() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(env(&[("MOLECULES_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, MoldbError::Env { var: "MOLECULES_BATCH_SIZE", .. }));

        let err = settings
            .apply_env(env(&[("MOLECULES_BACKEND", "rocksdb")]))
            .unwrap_err();
        assert!(matches!(err, MoldbError::Env { var: "MOLECULES_BACKEND", .. }));
    }

    #[test]
    fn test_memory_backend_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load_with(
            dir.path().join("config.json"),
            env(&[("MOLECULES_BACKEND", "memory")]),
        )
        .unwrap_err();
        assert!(matches!(err, MoldbError::EphemeralBackend(Backend::Memory)));

        let settings = Settings {
            backend: Backend::Memory,
            ..Settings::default()
        };
        assert!(matches!(
            settings.open_store(false),
            Err(MoldbError::EphemeralBackend(_))
        ));
    }

    #[test]
    fn test_store_config_follows_backend() {
        let mut settings = Settings {
            map_size: 1 << 20,
            max_map_size: 1 << 10,
            ..Settings::default()
        };
        let config = settings.store_config(true);
        assert_eq!(config.path, PathBuf::from("molecules.lmdb"));
        assert!(config.read_only);
        assert_eq!(config.max_map_size, 1 << 20);

        settings.backend = Backend::Sqlite;
        assert_eq!(settings.store_config(false).path, PathBuf::from("molecules.db"));
    }
}
