//! Mapping table reader.
//!
//! The mapping table is a CSV file with a header row. Two of its columns
//! matter: the file-naming key (InChIKey in the reference corpus) and the
//! canonical identifier (InChI). Other columns are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use moldb_core::{Identifier, MappingEntry};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Which header names hold the source key and the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingColumns {
    pub source_key: String,
    pub identifier: String,
}

impl Default for MappingColumns {
    fn default() -> Self {
        Self {
            source_key: "inchikey".to_string(),
            identifier: "inchi".to_string(),
        }
    }
}

/// One data row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingRow {
    Entry(MappingEntry),
    /// A row that cannot be used; `line` is 1-based, header included.
    Rejected { line: u64, reason: String },
}

/// Streams rows out of a mapping table without loading it into memory.
pub struct MappingReader<R> {
    records: csv::StringRecordsIntoIter<R>,
    source_idx: usize,
    identifier_idx: usize,
}

impl MappingReader<File> {
    /// Open a mapping table on disk.
    pub fn open(path: impl AsRef<Path>, columns: &MappingColumns) -> Result<Self> {
        let path = path.as_ref();
        let reader = builder().from_path(path).map_err(|source| IngestError::Mapping {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv(reader, columns)
    }
}

impl<R: Read> MappingReader<R> {
    /// Read a mapping table from any byte source.
    pub fn from_reader(reader: R, columns: &MappingColumns) -> Result<Self> {
        Self::from_csv(builder().from_reader(reader), columns)
    }

    fn from_csv(mut reader: csv::Reader<R>, columns: &MappingColumns) -> Result<Self> {
        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
        };
        let source_idx = position(&columns.source_key)?;
        let identifier_idx = position(&columns.identifier)?;

        Ok(Self {
            records: reader.into_records(),
            source_idx,
            identifier_idx,
        })
    }

    fn parse(&self, record: &csv::StringRecord) -> MappingRow {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let (Some(source_key), Some(raw_id)) =
            (record.get(self.source_idx), record.get(self.identifier_idx))
        else {
            return MappingRow::Rejected {
                line,
                reason: "row is missing a mapping column".to_string(),
            };
        };
        match Identifier::new(raw_id) {
            Ok(identifier) => MappingRow::Entry(MappingEntry {
                source_key: source_key.to_string(),
                identifier,
            }),
            Err(e) => MappingRow::Rejected {
                line,
                reason: e.to_string(),
            },
        }
    }
}

impl<R: Read> Iterator for MappingReader<R> {
    type Item = Result<MappingRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.records.next()? {
            Ok(record) => Some(Ok(self.parse(&record))),
            Err(e) if e.is_io_error() => Some(Err(IngestError::Csv(e))),
            Err(e) => Some(Ok(MappingRow::Rejected {
                line: e.position().map(|p| p.line()).unwrap_or(0),
                reason: e.to_string(),
            })),
        }
    }
}

fn builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All);
    builder
}
