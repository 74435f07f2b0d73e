//! RecordStore trait: the uniform contract every engine implements.
//!
//! Callers (the ingestor, the HTTP layer) hold a `dyn RecordStore` and cannot
//! tell which engine serves them except by latency. All methods block; run
//! them from worker threads for concurrency.

use bytes::Bytes;
use moldb_core::{Identifier, Record};

use crate::config::Backend;
use crate::error::{Result, StoreError};

/// Result of deleting a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    /// The record existed and is gone.
    Deleted,
    /// No record had that identifier; the store is unchanged.
    NotFound,
}

/// The RecordStore trait: synchronous, exact-key record persistence.
///
/// # Semantics shared by all engines
///
/// - **Last write wins**: `put` creates or overwrites.
/// - **Durable acks**: a mutating call returns only after the write is
///   persisted (unless the store was configured with `durable = false`).
/// - **Chunked batches**: `put_many` commits in transactions of at most the
///   configured batch size. A failed chunk is rolled back in full; earlier
///   chunks stay committed and are reported through
///   [`StoreError::BatchAborted`].
/// - **Parallel reads**: `get` may be called from many threads at once.
pub trait RecordStore: Send + Sync {
    /// Which engine this is.
    fn backend(&self) -> Backend;

    /// Look up a record by identifier.
    fn get(&self, id: &Identifier) -> Result<Option<Record>>;

    /// Store a record, replacing any previous content.
    fn put(&self, id: &Identifier, content: &[u8]) -> Result<()>;

    /// Remove a record.
    fn delete(&self, id: &Identifier) -> Result<DeleteResult>;

    /// Store many records. Returns the number of pairs written.
    ///
    /// Duplicate identifiers within `pairs` resolve to the last occurrence.
    fn put_many(&self, pairs: &[(Identifier, Bytes)]) -> Result<usize>;

    /// Look up several records, preserving input order.
    fn get_many(&self, ids: &[Identifier]) -> Result<Vec<(Identifier, Option<Bytes>)>> {
        ids.iter()
            .map(|id| Ok((id.clone(), self.get(id)?.map(|r| r.content))))
            .collect()
    }

    /// Number of records stored.
    fn len(&self) -> Result<u64>;

    /// Whether the store holds no records.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Every stored identifier, in byte order.
    fn identifiers(&self) -> Result<Vec<Identifier>>;

    /// Force everything written so far to stable storage.
    fn sync(&self) -> Result<()>;
}

/// Extension trait for common store patterns.
pub trait RecordStoreExt: RecordStore {
    /// Whether a record exists.
    fn contains(&self, id: &Identifier) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Every record, ordered by identifier bytes.
    ///
    /// Reads the whole store into memory; meant for tests and small stores.
    fn snapshot(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for id in self.identifiers()? {
            match self.get(&id)? {
                Some(record) => records.push(record),
                None => {
                    return Err(StoreError::Incompatible(format!(
                        "identifier {id} listed but not readable"
                    )))
                }
            }
        }
        Ok(records)
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

/// Drive `write_chunk` over `pairs` in chunks of `batch_size`.
///
/// Stops at the first failing chunk and wraps its error with the count of
/// records committed by the chunks before it.
pub(crate) fn write_chunked<F>(
    pairs: &[(Identifier, Bytes)],
    batch_size: usize,
    mut write_chunk: F,
) -> Result<usize>
where
    F: FnMut(&[(Identifier, Bytes)]) -> Result<()>,
{
    let mut committed = 0;
    for chunk in pairs.chunks(batch_size.max(1)) {
        if let Err(source) = write_chunk(chunk) {
            return Err(StoreError::BatchAborted {
                committed,
                source: Box::new(source),
            });
        }
        committed += chunk.len();
        tracing::debug!(chunk = chunk.len(), committed, "batch chunk committed");
    }
    Ok(committed)
}
