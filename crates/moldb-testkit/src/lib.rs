//! # moldb Testkit
//!
//! Testing utilities for moldb.
//!
//! ## Overview
//!
//! - **Fixtures**: throwaway on-disk stores and structure-file corpora
//! - **Generators**: proptest strategies for identifiers, content, and
//!   operation scripts
//! - **Scripts**: replay one operation sequence against any store, so
//!   engines can be diffed against each other
//!
//! ## Engine Parity
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use moldb_testkit::{generators::script, fixtures::TempStore, script::run_script};
//! use moldb_store::Backend;
//!
//! proptest! {
//!     #[test]
//!     fn engines_agree(ops in script(8, 32)) {
//!         let lmdb = TempStore::new(Backend::Lmdb);
//!         let sqlite = TempStore::new(Backend::Sqlite);
//!         prop_assert_eq!(run_script(lmdb.store(), &ops), run_script(sqlite.store(), &ops));
//!     }
//! }
//! ```
//!
//! ## Corpus Fixtures
//!
//! ```rust
//! use moldb_testkit::fixtures::Corpus;
//!
//! let corpus = Corpus::builder()
//!     .entry("XLYOFNOQVPJJNP-UHFFFAOYSA-N", "InChI=1S/H2O/h1H2", "3\nwater\n")
//!     .missing("QGZKDVFQNNGYKY-UHFFFAOYSA-N", "InChI=1S/H3N/h1H3")
//!     .build();
//! assert!(corpus.mapping_path().exists());
//! ```

pub mod fixtures;
pub mod generators;
pub mod script;

pub use fixtures::{small_config, Corpus, TempStore};
pub use script::{run_script, Op, Outcome, ScriptResult};
