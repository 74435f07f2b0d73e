//! Storage-key derivation.
//!
//! Engines with a bounded key size (LMDB's default is 511 bytes) cannot index
//! long InChI strings directly. Identifiers that fit are stored under their
//! own bytes; longer ones are stored under `DIGEST_KEY_TAG || blake3(id)`.
//!
//! The two forms cannot collide: an identifier never contains control bytes,
//! and the digest tag is one.

use crate::identifier::Identifier;

/// Largest identifier, in bytes, stored under its own bytes.
pub const MAX_INLINE_KEY_LEN: usize = 511;

/// First byte of every digest key.
pub const DIGEST_KEY_TAG: u8 = 0x01;

/// The byte key an engine indexes a record by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKey<'a> {
    /// The identifier's own bytes.
    Inline(&'a [u8]),
    /// Tag byte followed by the Blake3 digest of the identifier.
    Digest([u8; 33]),
}

impl<'a> StorageKey<'a> {
    pub fn derive(id: &'a Identifier) -> Self {
        let bytes = id.as_bytes();
        if bytes.len() <= MAX_INLINE_KEY_LEN {
            StorageKey::Inline(bytes)
        } else {
            let mut key = [0u8; 33];
            key[0] = DIGEST_KEY_TAG;
            key[1..].copy_from_slice(blake3::hash(bytes).as_bytes());
            StorageKey::Digest(key)
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StorageKey::Inline(bytes) => bytes,
            StorageKey::Digest(key) => key,
        }
    }

    /// Whether the value stored under this key must carry the identifier.
    pub fn is_digest(&self) -> bool {
        matches!(self, StorageKey::Digest(_))
    }
}

/// Whether raw key bytes read back from an engine are a digest key.
pub fn is_digest_key(raw: &[u8]) -> bool {
    raw.first() == Some(&DIGEST_KEY_TAG)
}
