//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use moldb_core::{Identifier, MAX_INLINE_KEY_LEN};

use crate::script::Op;

/// An InChI-shaped identifier of ordinary length.
pub fn inchi() -> impl Strategy<Value = Identifier> {
    "InChI=1S/[A-Z][A-Za-z0-9]{0,16}(/[a-z][0-9a-z,()+-]{0,40}){0,4}"
        .prop_filter_map("not a valid identifier", |s| Identifier::new(s).ok())
}

/// An identifier too long to be stored as an inline LMDB key.
pub fn long_identifier() -> impl Strategy<Value = Identifier> {
    "[0-9a-z,()-]{1,64}".prop_filter_map("not a valid identifier", |tail| {
        let body = "c1-2-3".repeat(MAX_INLINE_KEY_LEN / 6 + 1);
        Identifier::new(format!("InChI=1S/C900H/{body}{tail}")).ok()
    })
}

/// Any valid identifier, including non-ASCII text and padded input that
/// normalizes to something shorter.
pub fn identifier() -> impl Strategy<Value = Identifier> {
    prop_oneof![
        6 => inchi(),
        2 => "[ \t]{0,2}\\PC{1,24}[ \t]{0,2}"
            .prop_filter_map("not a valid identifier", |s| Identifier::new(s).ok()),
        1 => long_identifier(),
    ]
}

/// Record content up to `max_len` bytes, empty included.
pub fn content(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

/// A single operation drawing identifiers from `pool`.
///
/// Drawing from a small pool makes overwrites and deletes of existing
/// records common.
pub fn op(pool: Vec<Identifier>) -> impl Strategy<Value = Op> {
    let pick = prop::sample::select(pool);
    prop_oneof![
        4 => (pick.clone(), content(256)).prop_map(|(id, content)| Op::Put(id, content)),
        2 => pick.clone().prop_map(Op::Delete),
        1 => prop::collection::vec((pick, content(64)), 0..16).prop_map(Op::PutMany),
    ]
}

/// A sequence of up to `max_ops` operations over at most `pool_size`
/// distinct identifiers.
pub fn script(pool_size: usize, max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(identifier(), 1..=pool_size.max(1))
        .prop_flat_map(move |pool| prop::collection::vec(op(pool), 0..=max_ops))
}
