//! SQLite implementation of the RecordStore trait.
//!
//! One table keyed by identifier, content as a BLOB. Writes go through a
//! single connection behind a mutex; reads check out connections from a
//! small pool so concurrent lookups do not queue behind each other.

use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use moldb_core::{Identifier, Record};

use crate::config::{Backend, StoreConfig};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{write_chunked, DeleteResult, RecordStore};

const UPSERT: &str = "INSERT INTO molecules (identifier, content) VALUES (?1, ?2)
     ON CONFLICT(identifier) DO UPDATE SET content = excluded.content";
const SELECT_CONTENT: &str = "SELECT content FROM molecules WHERE identifier = ?1";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
pub struct SqliteStore {
    /// The write connection, protected by a mutex. Also serves reads for
    /// in-memory databases, which cannot be shared across connections.
    writer: Mutex<Connection>,
    /// Read connections; `None` for in-memory databases.
    readers: Option<ReaderPool>,
    batch_size: usize,
    read_only: bool,
}

/// Read-only connections, opened lazily, at most `max_open` at a time.
struct ReaderPool {
    path: PathBuf,
    state: Mutex<PoolState>,
    returned: Condvar,
    max_open: usize,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

impl ReaderPool {
    fn new(path: PathBuf, max_open: usize) -> Self {
        Self {
            path,
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
            max_open: max_open.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let reader = self.checkout()?;
        f(reader.conn())
    }

    /// Take an idle connection, open a new one if under the limit, or wait
    /// for one to come back.
    fn checkout(&self) -> Result<PooledReader<'_>> {
        let mut state = self.lock();
        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledReader { pool: self, conn: Some(conn) });
            }
            if state.open < self.max_open {
                state.open += 1;
                drop(state);
                return match open_reader(&self.path) {
                    Ok(conn) => Ok(PooledReader { pool: self, conn: Some(conn) }),
                    Err(e) => {
                        self.lock().open -= 1;
                        self.returned.notify_one();
                        Err(e)
                    }
                };
            }
            state = self
                .returned
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// A checked-out connection; goes back to the pool on drop.
struct PooledReader<'a> {
    pool: &'a ReaderPool,
    conn: Option<Connection>,
}

impl PooledReader<'_> {
    fn conn(&self) -> &Connection {
        // Only `Drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledReader<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.lock().idle.push(conn);
            self.pool.returned.notify_one();
        }
    }
}

fn open_reader(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

impl SqliteStore {
    /// Open a SQLite database as described by `config`.
    ///
    /// Writable opens create the file and run migrations; read-only opens
    /// require an existing database at the current schema version.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::open_inner(config).map_err(|e| match e {
            StoreError::Unavailable { .. } => e,
            other => StoreError::unavailable(&config.path, other),
        })
    }

    fn open_inner(config: &StoreConfig) -> Result<Self> {
        let path = config.path.as_path();

        let writer = if config.read_only {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            migration::verify(&conn)?;
            conn
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut conn = Connection::open(path)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            let synchronous = if config.durable { "FULL" } else { "NORMAL" };
            conn.pragma_update(None, "synchronous", synchronous)?;
            migration::migrate(&mut conn)?;
            conn
        };
        writer.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self {
            writer: Mutex::new(writer),
            readers: Some(ReaderPool::new(
                path.to_path_buf(),
                config.max_readers as usize,
            )),
            batch_size: config.batch_size,
            read_only: config.read_only,
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            writer: Mutex::new(conn),
            readers: None,
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            read_only: false,
        })
    }

    /// Change the `put_many` transaction size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(self.writer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Execute a read on a pooled connection (or the writer, in memory).
    fn with_reader<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        match &self.readers {
            Some(pool) => pool.with(f),
            None => {
                let conn = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
                f(&conn)
            }
        }
    }
}

fn read_content(conn: &Connection, id: &Identifier) -> Result<Option<Vec<u8>>> {
    let mut stmt = conn.prepare_cached(SELECT_CONTENT)?;
    Ok(stmt
        .query_row(params![id.as_str()], |row| row.get::<_, Vec<u8>>(0))
        .optional()?)
}

/// Write one chunk as a single transaction. Dropping the transaction on an
/// error rolls the whole chunk back.
fn write_chunk(conn: &mut Connection, chunk: &[(Identifier, Bytes)]) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(UPSERT)?;
        for (id, content) in chunk {
            stmt.execute(params![id.as_str(), &content[..]])?;
        }
    }
    tx.commit()?;
    Ok(())
}

impl RecordStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn get(&self, id: &Identifier) -> Result<Option<Record>> {
        let content = self.with_reader(|conn| read_content(conn, id))?;
        Ok(content.map(|c| Record::new(id.clone(), c)))
    }

    fn put(&self, id: &Identifier, content: &[u8]) -> Result<()> {
        let conn = self.writer()?;
        conn.prepare_cached(UPSERT)?
            .execute(params![id.as_str(), content])?;
        Ok(())
    }

    fn delete(&self, id: &Identifier) -> Result<DeleteResult> {
        let conn = self.writer()?;
        let removed = conn
            .prepare_cached("DELETE FROM molecules WHERE identifier = ?1")?
            .execute(params![id.as_str()])?;
        Ok(if removed > 0 {
            DeleteResult::Deleted
        } else {
            DeleteResult::NotFound
        })
    }

    fn put_many(&self, pairs: &[(Identifier, Bytes)]) -> Result<usize> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let mut conn = self.writer()?;
        write_chunked(pairs, self.batch_size, |chunk| write_chunk(&mut conn, chunk))
    }

    fn get_many(&self, ids: &[Identifier]) -> Result<Vec<(Identifier, Option<Bytes>)>> {
        self.with_reader(|conn| {
            // One read transaction so the results come from a single snapshot.
            let tx = conn.unchecked_transaction()?;
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                let content = read_content(&tx, id)?;
                results.push((id.clone(), content.map(Bytes::from)));
            }
            tx.finish()?;
            Ok(results)
        })
    }

    fn len(&self) -> Result<u64> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM molecules", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn identifiers(&self) -> Result<Vec<Identifier>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT identifier FROM molecules ORDER BY identifier")?;
            let raw = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw.into_iter()
                .map(|s| {
                    Identifier::new(s)
                        .map_err(|e| StoreError::Incompatible(format!("stored identifier: {e}")))
                })
                .collect()
        })
    }

    fn sync(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let conn = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))?;
        Ok(())
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

    fn pair(key: &str, content: &str) -> (Identifier, Bytes) {
        (id(key), Bytes::from(content.to_owned()))
    }

    fn open_temp(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(&StoreConfig::new(Backend::Sqlite, dir.path().join("m.db"))).unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let store = SqliteStore::open_memory().unwrap();
        let water = id("InChI=1S/H2O/h1H2");
        store.put(&water, b"3\n\nO 0 0 0\nH 1 0 0\nH -1 0 0").unwrap();

        let record = store.get(&water).unwrap().unwrap();
        assert_eq!(record.identifier, water);
        assert_eq!(&record.content[..], b"3\n\nO 0 0 0\nH 1 0 0\nH -1 0 0");
    }

    #[test]
    fn test_empty_content_is_not_absence() {
        let store = SqliteStore::open_memory().unwrap();
        store.put(&id("empty"), b"").unwrap();

        let record = store.get(&id("empty")).unwrap().unwrap();
        assert!(record.content.is_empty());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_overwrite_and_delete() {
        let store = SqliteStore::open_memory().unwrap();
        store.put(&id("k"), b"one").unwrap();
        store.put(&id("k"), b"two").unwrap();
        assert_eq!(&store.get(&id("k")).unwrap().unwrap().content[..], b"two");

        assert_eq!(store.delete(&id("k")).unwrap(), DeleteResult::Deleted);
        assert!(store.get(&id("k")).unwrap().is_none());
        assert_eq!(store.delete(&id("k")).unwrap(), DeleteResult::NotFound);
        assert_eq!(store.delete(&id("never")).unwrap(), DeleteResult::NotFound);
    }

    #[test]
    fn test_put_many_last_duplicate_wins() {
        let store = SqliteStore::open_memory().unwrap().with_batch_size(2);
        let written = store
            .put_many(&[pair("a", "1"), pair("b", "2"), pair("a", "3")])
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(&store.get(&id("a")).unwrap().unwrap().content[..], b"3");
        assert_eq!(&store.get(&id("b")).unwrap().unwrap().content[..], b"2");
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_failed_chunk_rolls_back_whole_chunk() {
        let store = SqliteStore::open_memory().unwrap().with_batch_size(2);
        store
            .writer
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON molecules
                 WHEN NEW.identifier = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'poisoned'); END;",
            )
            .unwrap();

        let err = store
            .put_many(&[
                pair("a", "1"),
                pair("b", "2"),
                pair("c", "3"),
                pair("poison", "4"),
                pair("d", "5"),
            ])
            .unwrap_err();

        assert_eq!(err.committed(), 2);
        assert!(store.get(&id("a")).unwrap().is_some());
        assert!(store.get(&id("b")).unwrap().is_some());
        assert!(store.get(&id("c")).unwrap().is_none());
        assert!(store.get(&id("d")).unwrap().is_none());
    }

    #[test]
    fn test_get_many_preserves_order() {
        let store = SqliteStore::open_memory().unwrap();
        store.put_many(&[pair("x", "X"), pair("y", "Y")]).unwrap();

        let results = store.get_many(&[id("y"), id("missing"), id("x")]).unwrap();
        assert_eq!(results[0], (id("y"), Some(Bytes::from_static(b"Y"))));
        assert_eq!(results[1], (id("missing"), None));
        assert_eq!(results[2], (id("x"), Some(Bytes::from_static(b"X"))));
    }

    #[test]
    fn test_reopen_persists() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_temp(&dir);
            store.put(&id("InChI=1S/CH4/h1H4"), b"methane").unwrap();
        }
        let store = open_temp(&dir);
        assert_eq!(
            &store.get(&id("InChI=1S/CH4/h1H4")).unwrap().unwrap().content[..],
            b"methane"
        );
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let dir = TempDir::new().unwrap();
        open_temp(&dir).put(&id("k"), b"v").unwrap();

        let config = StoreConfig::new(Backend::Sqlite, dir.path().join("m.db")).read_only(true);
        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(&store.get(&id("k")).unwrap().unwrap().content[..], b"v");
        assert!(matches!(store.put(&id("k"), b"w"), Err(StoreError::ReadOnly)));
        assert!(matches!(store.delete(&id("k")), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn test_read_only_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(Backend::Sqlite, dir.path().join("absent.db")).read_only(true);
        assert!(matches!(
            SqliteStore::open(&config),
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_garbage_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0xAB; 8192]).unwrap();

        let err = SqliteStore::open(&StoreConfig::new(Backend::Sqlite, &path)).err().unwrap();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_foreign_database_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL);
                 INSERT INTO schema_migrations VALUES (1, 0);
                 CREATE TABLE receipts (id BLOB PRIMARY KEY, body BLOB);",
            )
            .unwrap();

        for read_only in [false, true] {
            let config = StoreConfig::new(Backend::Sqlite, &path).read_only(read_only);
            let err = SqliteStore::open(&config).err().unwrap();
            assert!(err.is_unavailable(), "read_only={read_only}: {err}");
        }
    }

    #[test]
    fn test_concurrent_readers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_temp(&dir));
        let pairs: Vec<_> = (0..200)
            .map(|i| pair(&format!("InChI=1S/test{i}"), &format!("content {i}")))
            .collect();
        store.put_many(&pairs).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in (t..200).step_by(8) {
                        let record = store.get(&id(&format!("InChI=1S/test{i}"))).unwrap().unwrap();
                        assert_eq!(record.content_str(), Some(format!("content {i}").as_str()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_reader_pool_is_bounded() {
        let dir = TempDir::new().unwrap();
        let config =
            StoreConfig::new(Backend::Sqlite, dir.path().join("m.db")).max_readers(2);
        let store = SqliteStore::open(&config).unwrap();
        store.put(&id("InChI=1S/Kr"), b"krypton").unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        assert!(store.get(&id("InChI=1S/Kr")).unwrap().is_some());
                    }
                });
            }
        });

        let pool = store.readers.as_ref().unwrap();
        let state = pool.lock();
        assert!(state.open <= 2, "opened {} readers", state.open);
        assert_eq!(state.idle.len(), state.open);
    }
}
