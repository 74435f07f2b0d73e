//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1. A database stamped with
//! a version newer than this build knows about is refused rather than read.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current = current_version(conn)?.unwrap_or(0);
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::info!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    check_records_table(conn)
}

/// Check, without writing, that a database is at the current schema.
///
/// Used for read-only opens, which cannot migrate.
pub fn verify(conn: &Connection) -> Result<()> {
    let has_migrations: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if has_migrations.is_none() {
        return Err(StoreError::Migration(
            "database has no schema_migrations table".into(),
        ));
    }

    match current_version(conn)? {
        Some(CURRENT_VERSION) => check_records_table(conn),
        Some(other) => Err(StoreError::Migration(format!(
            "database schema version {other}, expected {CURRENT_VERSION}"
        ))),
        None => Err(StoreError::Migration("database schema is uninitialized".into())),
    }
}

/// The version stamp alone does not prove the file is ours; the records
/// table must be there with the columns every query relies on.
fn check_records_table(conn: &Connection) -> Result<()> {
    let columns = conn
        .prepare("SELECT name FROM pragma_table_info('molecules')")?
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if columns.is_empty() {
        return Err(StoreError::Migration("database has no molecules table".into()));
    }
    for required in ["identifier", "content"] {
        if !columns.iter().any(|c| c == required) {
            return Err(StoreError::Migration(format!(
                "molecules table has no {required} column"
            )));
        }
    }
    Ok(())
}

fn current_version(conn: &Connection) -> Result<Option<u32>> {
    Ok(conn.query_row(
        "SELECT MAX(version) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// No IF NOT EXISTS: a pre-existing `molecules` table with some other layout
/// must fail the open instead of being silently reused.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE molecules (
            identifier TEXT PRIMARY KEY,     -- normalized identifier, BINARY collation
            content BLOB NOT NULL            -- opaque structure payload, may be empty
        ) WITHOUT ROWID;
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
