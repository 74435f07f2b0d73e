//! Replayable operation scripts.
//!
//! A script is applied to a store one operation at a time; the per-op
//! outcomes plus the final contents form a [`ScriptResult`] that can be
//! compared across engines.

use bytes::Bytes;
use moldb_core::{Identifier, Record};
use moldb_store::{DeleteResult, RecordStore, RecordStoreExt};

/// One mutating call against a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put(Identifier, Bytes),
    Delete(Identifier),
    PutMany(Vec<(Identifier, Bytes)>),
}

/// What a single operation returned, with errors flattened to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Put,
    Deleted(DeleteResult),
    PutMany(usize),
    Failed(String),
}

/// Outcomes in script order plus the final store contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    pub outcomes: Vec<Outcome>,
    pub records: Vec<Record>,
}

/// Apply `op` to `store`.
pub fn apply<S: RecordStore + ?Sized>(store: &S, op: &Op) -> Outcome {
    let result = match op {
        Op::Put(id, content) => store.put(id, content).map(|()| Outcome::Put),
        Op::Delete(id) => store.delete(id).map(Outcome::Deleted),
        Op::PutMany(pairs) => store.put_many(pairs).map(Outcome::PutMany),
    };
    result.unwrap_or_else(|e| Outcome::Failed(e.to_string()))
}

/// Apply every op in order, then snapshot the store.
pub fn run_script<S: RecordStore + ?Sized>(store: &S, ops: &[Op]) -> ScriptResult {
    let outcomes = ops.iter().map(|op| apply(store, op)).collect();
    let records = store
        .snapshot()
        .unwrap_or_else(|e| panic!("snapshot failed: {e}"));
    ScriptResult { outcomes, records }
}
