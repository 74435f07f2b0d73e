//! Record and mapping-table types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// A stored `(identifier, content)` pair.
///
/// The content is opaque: usually the text of an XYZ structure file, but
/// never parsed or validated by any layer of moldb. Empty content is a valid
/// record, distinct from absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: Identifier,
    pub content: Bytes,
}

impl Record {
    pub fn new(identifier: Identifier, content: impl Into<Bytes>) -> Self {
        Self {
            identifier,
            content: content.into(),
        }
    }

    /// The content as text, if it is valid UTF-8.
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// One row of the ingestion mapping table: which file backs which record.
///
/// `source_key` is a file-naming key (an InChIKey in the reference corpus).
/// Used only while ingesting; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub source_key: String,
    pub identifier: Identifier,
}
