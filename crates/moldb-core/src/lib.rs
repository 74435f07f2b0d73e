//! # moldb Core
//!
//! Pure primitives for moldb: identifiers, the key codec, and records.
//!
//! This crate contains no I/O and no storage. Every other layer depends on it
//! so that the same logical identifier always maps to the same storage key.
//!
//! ## Key Types
//!
//! - [`Identifier`] - A validated, normalized chemical identifier (e.g. InChI)
//! - [`Record`] - A stored `(identifier, content)` pair
//! - [`MappingEntry`] - One row of the ingestion mapping table
//! - [`StorageKey`] - The byte key an engine actually indexes by
//!
//! ## Key Codec
//!
//! Identifiers arrive URL-encoded from the transport layer. See [`codec`]:
//!
//! ```rust
//! use moldb_core::codec;
//!
//! let id = codec::decode("InChI%3D1S%2FH2O%2Fh1H2").unwrap();
//! assert_eq!(id.as_str(), "InChI=1S/H2O/h1H2");
//! assert_eq!(codec::decode(&codec::encode(&id)).unwrap(), id);
//! ```

pub mod codec;
pub mod error;
pub mod identifier;
pub mod key;
pub mod record;

pub use codec::{decode, encode, normalize};
pub use error::InvalidKeyError;
pub use identifier::Identifier;
pub use key::{is_digest_key, StorageKey, DIGEST_KEY_TAG, MAX_INLINE_KEY_LEN};
pub use record::{MappingEntry, Record};
