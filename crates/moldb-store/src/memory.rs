//! In-memory implementation of the RecordStore trait.
//!
//! This is primarily for testing. It has the same semantics as the on-disk
//! engines but keeps everything in memory with no persistence, which makes
//! it the reference the parity tests compare LMDB and SQLite against.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use moldb_core::{Identifier, Record};

use crate::config::Backend;
use crate::error::Result;
use crate::traits::{DeleteResult, RecordStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
/// Keys are ordered by identifier bytes, the same order LMDB and SQLite's
/// BINARY collation use.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Identifier, Bytes>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn backend(&self) -> Backend {
        Backend::Memory
    }

    fn get(&self, id: &Identifier) -> Result<Option<Record>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(id)
            .map(|content| Record::new(id.clone(), content.clone())))
    }

    fn put(&self, id: &Identifier, content: &[u8]) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(id.clone(), Bytes::copy_from_slice(content));
        Ok(())
    }

    fn delete(&self, id: &Identifier) -> Result<DeleteResult> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(match records.remove(id) {
            Some(_) => DeleteResult::Deleted,
            None => DeleteResult::NotFound,
        })
    }

    fn put_many(&self, pairs: &[(Identifier, Bytes)]) -> Result<usize> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for (id, content) in pairs {
            records.insert(id.clone(), content.clone());
        }
        Ok(pairs.len())
    }

    fn len(&self) -> Result<u64> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.len() as u64)
    }

    fn identifiers(&self) -> Result<Vec<Identifier>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.keys().cloned().collect())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
