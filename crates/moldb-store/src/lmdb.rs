//! LMDB implementation of the RecordStore trait.
//!
//! A single memory-mapped file (`NO_SUB_DIR`, plus LMDB's `-lock` sidecar)
//! holding two named databases:
//!
//! - `molecules`: storage key -> value
//! - `meta`: `format_version` -> `"1"`
//!
//! ## Value layout
//!
//! Inline keys (the identifier's own bytes) store the raw content. Digest
//! keys store `u32 BE identifier length || identifier || content`, so the
//! identifier can be verified on read and listed by `identifiers()`.
//!
//! ## Map growth
//!
//! A write that hits `MDB_MAP_FULL` aborts its transaction, doubles the map
//! under the exclusive side of `remap`, and retries. Every transaction holds
//! the shared side, which is only contended while a resize is in progress.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use heed::types::{Bytes as RawBytes, Str};
use heed::{Database, Env, EnvFlags, EnvOpenOptions, MdbError, RoTxn, RwTxn};

use moldb_core::{is_digest_key, Identifier, Record, StorageKey};

use crate::config::{Backend, StoreConfig};
use crate::error::{Result, StoreError};
use crate::traits::{write_chunked, DeleteResult, RecordStore};

const RECORDS_DB: &str = "molecules";
const META_DB: &str = "meta";
const FORMAT_KEY: &str = "format_version";
const FORMAT_VERSION: &str = "1";

/// Map sizes are rounded up to this, a multiple of every common page size.
const MAP_ALIGN: usize = 64 * 1024;

type RecordDb = Database<RawBytes, RawBytes>;
type MetaDb = Database<Str, Str>;

/// LMDB-based store implementation.
pub struct LmdbStore {
    env: Env,
    records: RecordDb,
    path: PathBuf,
    /// Shared by every transaction, exclusive while resizing the map.
    remap: RwLock<()>,
    batch_size: usize,
    max_map_size: usize,
    read_only: bool,
}

impl LmdbStore {
    /// Open (or, unless read-only, create) the environment at `config.path`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::open_inner(config).map_err(|e| match e {
            StoreError::Unavailable { .. } => e,
            other => StoreError::unavailable(&config.path, other),
        })
    }

    fn open_inner(config: &StoreConfig) -> Result<Self> {
        // heed resolves the parent directory of a NO_SUB_DIR path, which is
        // empty for a bare file name.
        let path = if config.path.is_relative() {
            std::env::current_dir()?.join(&config.path)
        } else {
            config.path.clone()
        };
        let path = path.as_path();
        if !config.read_only {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut flags = EnvFlags::NO_SUB_DIR | EnvFlags::NO_READ_AHEAD;
        if config.read_only {
            flags |= EnvFlags::READ_ONLY;
        }
        if !config.durable {
            flags |= EnvFlags::NO_SYNC | EnvFlags::NO_META_SYNC;
        }

        let mut options = EnvOpenOptions::new();
        options
            .map_size(align_map_size(config.initial_map_size))
            .max_dbs(2)
            .max_readers(config.max_readers);
        // SAFETY: the file is only ever opened through this type, one handle
        // at a time per process (`Drop` unregisters it), and never truncated
        // or modified behind LMDB's back.
        let env = unsafe {
            options.flags(flags);
            options.open(path)?
        };

        let opened = if config.read_only {
            open_existing(&env)
        } else {
            create_or_verify(&env)
        };
        let counted = opened.and_then(|records| {
            let rtxn = env.read_txn()?;
            Ok((records, records.len(&rtxn)?))
        });
        let (records, stats) = match counted {
            Ok(counted) => counted,
            Err(e) => {
                // Unregister the environment so the file can be opened again.
                let _closing = env.prepare_for_closing();
                return Err(e);
            }
        };
        tracing::info!(
            path = %path.display(),
            records = stats,
            map_size = env.info().map_size,
            read_only = config.read_only,
            "lmdb environment opened"
        );

        Ok(Self {
            env,
            records,
            path: path.to_path_buf(),
            remap: RwLock::new(()),
            batch_size: config.batch_size,
            max_map_size: config.max_map_size.max(config.initial_map_size),
            read_only: config.read_only,
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the memory map, in bytes.
    pub fn map_size(&self) -> usize {
        self.env.info().map_size
    }

    /// Run `op` in a write transaction, growing the map and retrying if it
    /// fills up. Nothing from a failed attempt is visible afterwards.
    fn write_txn<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(&mut RwTxn<'_>) -> Result<T>,
    {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        loop {
            let observed = self.map_size();
            let attempt = {
                let _gate = self.remap.read().unwrap_or_else(PoisonError::into_inner);
                let mut wtxn = self.env.write_txn()?;
                match op(&mut wtxn) {
                    Ok(value) => wtxn.commit().map(|()| value).map_err(StoreError::from),
                    Err(e) => Err(e),
                }
            };
            match attempt {
                Err(StoreError::Lmdb(heed::Error::Mdb(MdbError::MapFull))) => self.grow(observed)?,
                other => return other,
            }
        }
    }

    /// Double the map, unless another writer already grew it past `observed`.
    fn grow(&self, observed: usize) -> Result<()> {
        let _gate = self.remap.write().unwrap_or_else(PoisonError::into_inner);
        let current = self.map_size();
        if current > observed {
            return Ok(());
        }
        if current >= self.max_map_size {
            tracing::error!(map_size = current, "lmdb map full at configured maximum");
            return Err(StoreError::Lmdb(heed::Error::Mdb(MdbError::MapFull)));
        }
        let next = align_map_size(current.saturating_mul(2)).min(self.max_map_size);
        tracing::warn!(from = current, to = next, "lmdb map full, growing");
        // SAFETY: holding the exclusive gate means no transaction is open in
        // this process, which is what mdb_env_set_mapsize requires.
        unsafe { self.env.resize(next)? };
        Ok(())
    }

    fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&RoTxn<'_>) -> Result<T>,
    {
        let _gate = self.remap.read().unwrap_or_else(PoisonError::into_inner);
        let rtxn = self.env.read_txn()?;
        op(&rtxn)
    }

    fn get_in<'t>(&self, txn: &'t RoTxn<'_>, id: &Identifier) -> Result<Option<&'t [u8]>> {
        let key = StorageKey::derive(id);
        match self.records.get(txn, key.as_bytes())? {
            Some(raw) => unpack(&key, id, raw),
            None => Ok(None),
        }
    }

    fn put_in(&self, txn: &mut RwTxn<'_>, id: &Identifier, content: &[u8]) -> Result<()> {
        let key = StorageKey::derive(id);
        let value = pack(&key, id, content);
        self.records.put(txn, key.as_bytes(), &value)?;
        Ok(())
    }
}

/// Writable open: create both databases on first use, otherwise check the
/// format stamp.
fn create_or_verify(env: &Env) -> Result<RecordDb> {
    let mut wtxn = env.write_txn()?;
    let meta: MetaDb = env.create_database(&mut wtxn, Some(META_DB))?;
    let stamp = meta.get(&wtxn, FORMAT_KEY)?.map(str::to_owned);
    match stamp.as_deref() {
        Some(FORMAT_VERSION) => {}
        Some(other) => {
            return Err(StoreError::Incompatible(format!(
                "lmdb format version {other}, expected {FORMAT_VERSION}"
            )))
        }
        None => {
            if env
                .open_database::<RawBytes, RawBytes>(&wtxn, Some(RECORDS_DB))?
                .is_some()
            {
                return Err(StoreError::Incompatible(
                    "records database exists without a format stamp".into(),
                ));
            }
            meta.put(&mut wtxn, FORMAT_KEY, FORMAT_VERSION)?;
        }
    }
    let records: RecordDb = env.create_database(&mut wtxn, Some(RECORDS_DB))?;
    wtxn.commit()?;
    Ok(records)
}

/// Read-only open: both databases must already exist with the right stamp.
fn open_existing(env: &Env) -> Result<RecordDb> {
    let rtxn = env.read_txn()?;
    let meta: MetaDb = env
        .open_database(&rtxn, Some(META_DB))?
        .ok_or_else(|| StoreError::Incompatible("missing meta database".into()))?;
    match meta.get(&rtxn, FORMAT_KEY)? {
        Some(FORMAT_VERSION) => {}
        Some(other) => {
            return Err(StoreError::Incompatible(format!(
                "lmdb format version {other}, expected {FORMAT_VERSION}"
            )))
        }
        None => return Err(StoreError::Incompatible("missing format stamp".into())),
    }
    let records: RecordDb = env
        .open_database(&rtxn, Some(RECORDS_DB))?
        .ok_or_else(|| StoreError::Incompatible("missing records database".into()))?;
    rtxn.commit()?;
    Ok(records)
}

fn align_map_size(size: usize) -> usize {
    size.max(MAP_ALIGN).div_ceil(MAP_ALIGN).saturating_mul(MAP_ALIGN)
}

fn pack<'a>(key: &StorageKey<'_>, id: &Identifier, content: &'a [u8]) -> Cow<'a, [u8]> {
    if !key.is_digest() {
        return Cow::Borrowed(content);
    }
    let id_bytes = id.as_bytes();
    let mut value = Vec::with_capacity(4 + id_bytes.len() + content.len());
    value.extend_from_slice(&(id_bytes.len() as u32).to_be_bytes());
    value.extend_from_slice(id_bytes);
    value.extend_from_slice(content);
    Cow::Owned(value)
}

/// Content stored under `key`, or `None` if a digest key belongs to a
/// different identifier.
fn unpack<'t>(key: &StorageKey<'_>, id: &Identifier, raw: &'t [u8]) -> Result<Option<&'t [u8]>> {
    if !key.is_digest() {
        return Ok(Some(raw));
    }
    let (stored_id, content) = split_digest_value(raw)?;
    Ok((stored_id == id.as_bytes()).then_some(content))
}

fn split_digest_value(raw: &[u8]) -> Result<(&[u8], &[u8])> {
    let header: [u8; 4] = raw
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| StoreError::Incompatible("digest value shorter than header".into()))?;
    let len = u32::from_be_bytes(header) as usize;
    let rest = &raw[4..];
    if rest.len() < len {
        return Err(StoreError::Incompatible("digest value truncated".into()));
    }
    Ok(rest.split_at(len))
}

fn identifier_from_raw(key: &[u8], value: &[u8]) -> Result<Identifier> {
    let bytes = if is_digest_key(key) {
        split_digest_value(value)?.0
    } else {
        key
    };
    let text = std::str::from_utf8(bytes)
        .map_err(|_| StoreError::Incompatible("stored key is not UTF-8".into()))?;
    Identifier::new(text).map_err(|e| StoreError::Incompatible(format!("stored identifier: {e}")))
}

impl RecordStore for LmdbStore {
    fn backend(&self) -> Backend {
        Backend::Lmdb
    }

    fn get(&self, id: &Identifier) -> Result<Option<Record>> {
        self.read(|rtxn| {
            Ok(self
                .get_in(rtxn, id)?
                .map(|content| Record::new(id.clone(), Bytes::copy_from_slice(content))))
        })
    }

    fn put(&self, id: &Identifier, content: &[u8]) -> Result<()> {
        self.write_txn(|wtxn| self.put_in(wtxn, id, content))
    }

    fn delete(&self, id: &Identifier) -> Result<DeleteResult> {
        self.write_txn(|wtxn| {
            if self.get_in(wtxn, id)?.is_none() {
                return Ok(DeleteResult::NotFound);
            }
            let key = StorageKey::derive(id);
            self.records.delete(wtxn, key.as_bytes())?;
            Ok(DeleteResult::Deleted)
        })
    }

    fn put_many(&self, pairs: &[(Identifier, Bytes)]) -> Result<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }
        write_chunked(pairs, self.batch_size, |chunk| {
            self.write_txn(|wtxn| {
                for (id, content) in chunk {
                    self.put_in(wtxn, id, content)?;
                }
                Ok(())
            })
        })
    }

    fn get_many(&self, ids: &[Identifier]) -> Result<Vec<(Identifier, Option<Bytes>)>> {
        self.read(|rtxn| {
            ids.iter()
                .map(|id| {
                    let content = self.get_in(rtxn, id)?.map(Bytes::copy_from_slice);
                    Ok((id.clone(), content))
                })
                .collect()
        })
    }

    fn len(&self) -> Result<u64> {
        self.read(|rtxn| Ok(self.records.len(rtxn)?))
    }

    fn identifiers(&self) -> Result<Vec<Identifier>> {
        let mut ids = self.read(|rtxn| {
            let mut ids = Vec::new();
            for entry in self.records.iter(rtxn)? {
                let (key, value) = entry?;
                ids.push(identifier_from_raw(key, value)?);
            }
            Ok(ids)
        })?;
        // Digest keys sort apart from inline ones; restore identifier order.
        ids.sort_unstable();
        Ok(ids)
    }

    fn sync(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.env.force_sync()?;
        Ok(())
    }
}

impl Drop for LmdbStore {
    fn drop(&mut self) {
        // heed keeps every environment registered until told otherwise; the
        // `env` field then drops the last handle and closes the file.
        let _closing = self.env.clone().prepare_for_closing();
        tracing::debug!(path = %self.path.display(), "lmdb environment closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn config(dir: &TempDir) -> StoreConfig {
        StoreConfig::new(Backend::Lmdb, dir.path().join("molecules.lmdb"))
            .initial_map_size(1024 * 1024)
    }

    #[test]
    fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(&config(&dir)).unwrap();
        let ethanol = id("InChI=1S/C2H6O/c1-2-3/h3H,2H2,1H3");

        store.put(&ethanol, b"3\n\nC 0 0 0\nH 1 0 0\nH -1 0 0").unwrap();
        let record = store.get(&ethanol).unwrap().unwrap();
        assert_eq!(&record.content[..], b"3\n\nC 0 0 0\nH 1 0 0\nH -1 0 0");

        assert_eq!(store.delete(&ethanol).unwrap(), DeleteResult::Deleted);
        assert!(store.get(&ethanol).unwrap().is_none());
        assert_eq!(store.delete(&ethanol).unwrap(), DeleteResult::NotFound);
    }

    #[test]
    fn test_empty_content_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(&config(&dir)).unwrap();
        store.put(&id("empty"), b"").unwrap();
        assert!(store.get(&id("empty")).unwrap().unwrap().content.is_empty());
    }

    #[test]
    fn test_long_identifier_uses_digest_key() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(&config(&dir)).unwrap();
        let long = id(&format!("InChI=1S/C{}H/{}", 900, "c1".repeat(400)));
        assert!(StorageKey::derive(&long).is_digest());

        store.put(&long, b"big molecule").unwrap();
        store.put(&id("short"), b"small").unwrap();

        assert_eq!(&store.get(&long).unwrap().unwrap().content[..], b"big molecule");
        assert_eq!(store.identifiers().unwrap(), vec![long.clone(), id("short")]);
        assert_eq!(store.delete(&long).unwrap(), DeleteResult::Deleted);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_map_grows_transparently() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(&config(&dir).initial_map_size(64 * 1024)).unwrap();
        let initial = store.map_size();

        let content = Bytes::from(vec![b'x'; 2048]);
        let pairs: Vec<_> = (0..2000)
            .map(|i| (id(&format!("InChI=1S/grow{i:05}")), content.clone()))
            .collect();
        assert_eq!(store.put_many(&pairs).unwrap(), 2000);

        assert!(store.map_size() > initial);
        assert_eq!(store.len().unwrap(), 2000);
        assert_eq!(
            &store.get(&id("InChI=1S/grow01999")).unwrap().unwrap().content[..],
            &content[..]
        );
    }

    #[test]
    fn test_growth_ceiling_discards_failed_batch() {
        let dir = TempDir::new().unwrap();
        let store = LmdbStore::open(
            &config(&dir)
                .initial_map_size(64 * 1024)
                .max_map_size(256 * 1024),
        )
        .unwrap();
        store.put(&id("before"), b"kept").unwrap();

        let content = Bytes::from(vec![b'y'; 4096]);
        let pairs: Vec<_> = (0..500)
            .map(|i| (id(&format!("overflow{i}")), content.clone()))
            .collect();
        let err = store.put_many(&pairs).unwrap_err();

        assert_eq!(err.committed(), 0);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(&store.get(&id("before")).unwrap().unwrap().content[..], b"kept");
    }

    #[test]
    fn test_reopen_read_only() {
        let dir = TempDir::new().unwrap();
        {
            let store = LmdbStore::open(&config(&dir)).unwrap();
            store.put(&id("k"), b"v").unwrap();
        }
        let store = LmdbStore::open(&config(&dir).read_only(true)).unwrap();
        assert_eq!(&store.get(&id("k")).unwrap().unwrap().content[..], b"v");
        assert!(matches!(store.put(&id("k"), b"w"), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn test_reopen_cycles_release_the_environment() {
        let dir = TempDir::new().unwrap();
        for round in 0..3u8 {
            let writer = LmdbStore::open(&config(&dir).durable(round % 2 == 0)).unwrap();
            writer.put(&id("k"), &[round]).unwrap();
            drop(writer);

            let reader = LmdbStore::open(&config(&dir).read_only(true)).unwrap();
            assert_eq!(&reader.get(&id("k")).unwrap().unwrap().content[..], &[round]);
        }
    }

    #[test]
    fn test_failed_open_does_not_pin_the_file() {
        let dir = TempDir::new().unwrap();
        {
            let store = LmdbStore::open(&config(&dir)).unwrap();
            let mut wtxn = store.env.write_txn().unwrap();
            let meta: MetaDb = store
                .env
                .open_database(&wtxn, Some(META_DB))
                .unwrap()
                .unwrap();
            meta.put(&mut wtxn, FORMAT_KEY, "99").unwrap();
            wtxn.commit().unwrap();
        }
        assert!(LmdbStore::open(&config(&dir)).is_err());

        // Different options: still reports the format, not a stale handle.
        match LmdbStore::open(&config(&dir).read_only(true)) {
            Err(StoreError::Unavailable { reason, .. }) => {
                assert!(reason.contains("format version 99"), "{reason}")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened an incompatible file"),
        }
    }

    #[test]
    fn test_read_only_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = LmdbStore::open(&config(&dir).read_only(true)).err().unwrap();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_garbage_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("molecules.lmdb"), vec![0xCD; 16 * 1024]).unwrap();
        let err = LmdbStore::open(&config(&dir)).err().unwrap();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_format_mismatch_is_unavailable() {
        let dir = TempDir::new().unwrap();
        {
            let store = LmdbStore::open(&config(&dir)).unwrap();
            let mut wtxn = store.env.write_txn().unwrap();
            let meta: MetaDb = store
                .env
                .open_database(&wtxn, Some(META_DB))
                .unwrap()
                .unwrap();
            meta.put(&mut wtxn, FORMAT_KEY, "99").unwrap();
            wtxn.commit().unwrap();
        }
        let err = LmdbStore::open(&config(&dir)).err().unwrap();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn test_concurrent_readers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LmdbStore::open(&config(&dir)).unwrap());
        let pairs: Vec<_> = (0..300)
            .map(|i| (id(&format!("InChI=1S/r{i}")), Bytes::from(format!("c{i}"))))
            .collect();
        store.put_many(&pairs).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in (t..300).step_by(8) {
                        let record = store.get(&id(&format!("InChI=1S/r{i}"))).unwrap().unwrap();
                        assert_eq!(record.content_str(), Some(format!("c{i}").as_str()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_align_map_size() {
        assert_eq!(align_map_size(0), MAP_ALIGN);
        assert_eq!(align_map_size(MAP_ALIGN + 1), 2 * MAP_ALIGN);
        assert_eq!(align_map_size(3 * MAP_ALIGN), 3 * MAP_ALIGN);
    }
}
