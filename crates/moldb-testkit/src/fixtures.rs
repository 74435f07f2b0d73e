//! Test fixtures and helpers.
//!
//! Throwaway stores and corpora that live in a temporary directory and
//! disappear when dropped.

use std::path::{Path, PathBuf};

use moldb_ingest::IngestOptions;
use moldb_store::{open_store, Backend, RecordStore, Result, StoreConfig};
use tempfile::TempDir;

/// A store config sized for tests: a 1 MiB initial LMDB map (so growth is
/// exercised) and small batches.
pub fn small_config(backend: Backend, path: impl Into<PathBuf>) -> StoreConfig {
    StoreConfig::new(backend, path)
        .initial_map_size(1024 * 1024)
        .max_map_size(1024 * 1024 * 1024)
        .batch_size(64)
}

/// A store backed by a file in its own temporary directory.
pub struct TempStore {
    dir: TempDir,
    config: StoreConfig,
    store: Box<dyn RecordStore>,
}

impl TempStore {
    /// Open a fresh, writable store. Panics if the engine cannot open.
    pub fn new(backend: Backend) -> Self {
        Self::with_config(backend, |config| config)
    }

    /// Open a fresh store, adjusting the test config first.
    pub fn with_config(backend: Backend, adjust: impl FnOnce(StoreConfig) -> StoreConfig) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let file = match backend {
            Backend::Sqlite => "molecules.db",
            Backend::Lmdb | Backend::Memory => "molecules.lmdb",
        };
        let config = adjust(small_config(backend, dir.path().join(file)));
        let store = open_store(&config).expect("open temp store");
        Self { dir, config, store }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Close the store and open the same file again.
    ///
    /// The memory backend comes back empty.
    pub fn reopen(self, read_only: bool) -> Result<Self> {
        let TempStore { dir, config, store } = self;
        drop(store);
        let config = config.read_only(read_only);
        let store = open_store(&config)?;
        Ok(Self { dir, config, store })
    }
}

/// An on-disk ingestion corpus: a directory of structure files and a CSV
/// mapping table.
pub struct Corpus {
    dir: TempDir,
    content_dir: PathBuf,
    mapping_path: PathBuf,
    len: usize,
}

impl Corpus {
    pub fn builder() -> CorpusBuilder {
        CorpusBuilder::default()
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn mapping_path(&self) -> &Path {
        &self.mapping_path
    }

    /// Mapping rows written, including rows without a file.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ingest options pointing at this corpus with the default columns.
    pub fn options(&self) -> IngestOptions {
        IngestOptions::new(&self.content_dir)
    }
}

/// Collects mapping rows and files for a [`Corpus`].
#[derive(Debug, Default)]
pub struct CorpusBuilder {
    rows: Vec<(String, String, Option<Vec<u8>>)>,
}

impl CorpusBuilder {
    /// A mapping row whose structure file exists.
    pub fn entry(
        mut self,
        source_key: &str,
        identifier: &str,
        content: impl AsRef<[u8]>,
    ) -> Self {
        self.rows.push((
            source_key.to_string(),
            identifier.to_string(),
            Some(content.as_ref().to_vec()),
        ));
        self
    }

    /// A mapping row whose structure file is absent.
    pub fn missing(mut self, source_key: &str, identifier: &str) -> Self {
        self.rows
            .push((source_key.to_string(), identifier.to_string(), None));
        self
    }

    /// `count` generated molecules with distinct keys, identifiers, and content.
    pub fn generated(mut self, count: usize) -> Self {
        for i in 0..count {
            let key = format!("GENERATED{i:08}-UHFFFAOYSA-N");
            let id = format!("InChI=1S/C{}H{}/c{i}", i % 60 + 1, i % 120 + 2);
            let content = format!("1\ngenerated {i}\nC 0.0 0.0 {i}.0\n");
            self.rows.push((key, id, Some(content.into_bytes())));
        }
        self
    }

    /// Write the files and the mapping table. Panics on I/O failure.
    pub fn build(self) -> Corpus {
        let dir = TempDir::new().expect("create temp dir");
        let content_dir = dir.path().join("xyz_files");
        std::fs::create_dir(&content_dir).expect("create content dir");
        let mapping_path = dir.path().join("inchi_mapping.csv");

        let mut writer = csv::Writer::from_path(&mapping_path).expect("create mapping table");
        writer
            .write_record(["inchikey", "inchi"])
            .expect("write header");
        for (key, id, content) in &self.rows {
            writer.write_record([key, id]).expect("write row");
            if let Some(content) = content {
                std::fs::write(content_dir.join(format!("{key}.xyz")), content)
                    .expect("write structure file");
            }
        }
        writer.flush().expect("flush mapping table");

        Corpus {
            dir,
            content_dir,
            mapping_path,
            len: self.rows.len(),
        }
    }
}
