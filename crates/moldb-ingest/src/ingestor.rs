//! The Ingestor: materialize a store from a mapping table and a corpus of
//! individually named content files.
//!
//! For each mapping row the content file `content_dir/<source_key>.<ext>` is
//! read and queued; full batches go to [`RecordStore::put_many`]. Rows whose
//! file is missing or unreadable are logged and counted, never fatal. A
//! failed batch is counted and the run moves on, unless the store itself is
//! gone.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bytes::Bytes;
use moldb_core::{Identifier, MappingEntry};
use moldb_store::{RecordStore, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::mapping::{MappingColumns, MappingReader, MappingRow};
use crate::summary::{per_second, IngestSummary, Progress};

/// Rows between progress reports.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// Configuration for an ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Directory holding one content file per source key.
    pub content_dir: PathBuf,
    /// Content file extension, without the dot.
    pub extension: String,
    pub columns: MappingColumns,
    /// Pairs per `put_many` call.
    pub batch_size: usize,
    pub progress_interval: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("./data/xyz_files"),
            extension: "xyz".to_string(),
            columns: MappingColumns::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl IngestOptions {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            ..Self::default()
        }
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn columns(mut self, columns: MappingColumns) -> Self {
        self.columns = columns;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn progress_interval(mut self, rows: u64) -> Self {
        self.progress_interval = rows;
        self
    }
}

type ProgressHook<'a> = Box<dyn FnMut(&Progress) + 'a>;

/// Drives one ingestion run into a store.
pub struct Ingestor<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    options: IngestOptions,
    on_progress: Option<ProgressHook<'a>>,
}

impl<'a, S: RecordStore + ?Sized> Ingestor<'a, S> {
    pub fn new(store: &'a S, options: IngestOptions) -> Self {
        Self {
            store,
            options,
            on_progress: None,
        }
    }

    /// Call `hook` at every progress report, in addition to logging.
    pub fn on_progress(mut self, hook: impl FnMut(&Progress) + 'a) -> Self {
        self.on_progress = Some(Box::new(hook));
        self
    }

    /// Ingest every row of the mapping table at `mapping_path`.
    pub fn run(&mut self, mapping_path: impl AsRef<Path>) -> Result<IngestSummary> {
        let mapping_path = mapping_path.as_ref();
        tracing::info!(
            mapping = %mapping_path.display(),
            content_dir = %self.options.content_dir.display(),
            backend = %self.store.backend(),
            batch_size = self.options.batch_size,
            "starting ingestion"
        );
        let rows = MappingReader::open(mapping_path, &self.options.columns)?;
        self.run_rows(rows)
    }

    /// Ingest a mapping table read from `reader`.
    pub fn run_reader<R: Read>(&mut self, reader: R) -> Result<IngestSummary> {
        let rows = MappingReader::from_reader(reader, &self.options.columns)?;
        self.run_rows(rows)
    }

    fn run_rows<I>(&mut self, rows: I) -> Result<IngestSummary>
    where
        I: Iterator<Item = Result<MappingRow>>,
    {
        if !self.options.content_dir.is_dir() {
            return Err(IngestError::ContentDir(self.options.content_dir.clone()));
        }

        let started = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let mut progress = Progress::default();
        let mut batch: Vec<(Identifier, Bytes)> = Vec::with_capacity(batch_size);

        for row in rows {
            progress.seen += 1;
            match row? {
                MappingRow::Entry(entry) => match self.load(&entry) {
                    Some(content) => batch.push((entry.identifier, content)),
                    None => progress.skipped += 1,
                },
                MappingRow::Rejected { line, reason } => {
                    tracing::warn!(line, %reason, "skipping mapping row");
                    progress.skipped += 1;
                }
            }

            if batch.len() >= batch_size {
                self.flush(&mut batch, &mut progress)?;
            }
            if self.options.progress_interval > 0
                && progress.seen % self.options.progress_interval == 0
            {
                progress.pending = batch.len() as u64;
                self.report(&progress, started);
            }
        }
        self.flush(&mut batch, &mut progress)?;
        if let Err(e) = self.store.sync() {
            // Committed batches are already in the store; keep the counts.
            tracing::error!(error = %e, "final sync failed");
        }

        let summary = IngestSummary {
            total: progress.seen,
            written: progress.written,
            skipped: progress.skipped,
            failed: progress.failed,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            total = summary.total,
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "ingestion finished"
        );
        Ok(summary)
    }

    /// Where the content for `source_key` lives, or `None` if the key could
    /// name something outside the content directory.
    pub fn resolve(&self, source_key: &str) -> Option<PathBuf> {
        let unsafe_key = source_key.is_empty()
            || source_key == "."
            || source_key == ".."
            || source_key.contains(['/', '\\', '\0']);
        if unsafe_key {
            return None;
        }
        let file_name = if self.options.extension.is_empty() {
            source_key.to_string()
        } else {
            format!("{source_key}.{}", self.options.extension)
        };
        Some(self.options.content_dir.join(file_name))
    }

    fn load(&self, entry: &MappingEntry) -> Option<Bytes> {
        let Some(path) = self.resolve(&entry.source_key) else {
            tracing::warn!(source_key = %entry.source_key, "skipping unsafe source key");
            return None;
        };
        match read_content(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    source_key = %entry.source_key,
                    path = %path.display(),
                    "content file missing, skipping"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    source_key = %entry.source_key,
                    path = %path.display(),
                    error = %e,
                    "content file unreadable, skipping"
                );
                None
            }
        }
    }

    fn flush(&self, batch: &mut Vec<(Identifier, Bytes)>, progress: &mut Progress) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let size = batch.len() as u64;
        match self.store.put_many(batch.as_slice()) {
            Ok(written) => progress.written += written as u64,
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "store unusable, aborting ingestion");
                return Err(IngestError::Store(e));
            }
            Err(e) => {
                let committed = e.committed() as u64;
                progress.written += committed;
                progress.failed += size - committed;
                tracing::error!(
                    error = %e,
                    batch = size,
                    committed,
                    "batch write failed, continuing"
                );
            }
        }
        batch.clear();
        Ok(())
    }

    fn report(&mut self, progress: &Progress, started: Instant) {
        let rate = per_second(progress.written, started.elapsed());
        tracing::info!(
            seen = progress.seen,
            written = progress.written,
            skipped = progress.skipped,
            failed = progress.failed,
            rate = format_args!("{rate:.0}/s"),
            "ingestion progress"
        );
        if let Some(hook) = self.on_progress.as_mut() {
            hook(progress);
        }
    }
}

fn read_content(path: &Path) -> io::Result<Bytes> {
    let mut file = File::open(path)?;
    let mut buf = Vec::with_capacity(file.metadata().map(|m| m.len() as usize).unwrap_or(0));
    file.read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}
