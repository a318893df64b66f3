//! SQLite-backed durable key-value store.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::{Connection, OptionalExtension, params};

use super::{KeyValueStore, PersistError, PersistResult};

/// Default storage ceiling, matching a typical browser origin quota.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// SQLite implementation of [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
    quota_bytes: Option<usize>,
}

impl SqliteKvStore {
    /// Opens or creates a store at `path` with [`DEFAULT_QUOTA_BYTES`].
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn, Some(DEFAULT_QUOTA_BYTES))
    }

    /// Opens an in-memory SQLite store.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn, Some(DEFAULT_QUOTA_BYTES))
    }

    /// Replaces the storage ceiling; `None` disables the check.
    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Total bytes held across all keys and values.
    pub fn used_bytes(&self) -> PersistResult<usize> {
        let conn = self.lock()?;
        used_bytes_excluding(&conn, "")
    }

    fn init_connection(conn: Connection, quota_bytes: Option<usize>) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            quota_bytes,
        })
    }

    fn lock(&self) -> PersistResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PersistError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> PersistResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> PersistResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if let Some(quota) = self.quota_bytes {
            let needed = used_bytes_excluding(&tx, key)? + key.len() + value.len();
            if needed > quota {
                return Err(PersistError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }
        tx.execute(
            "INSERT INTO kv(key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PersistResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn used_bytes_excluding(conn: &Connection, key: &str) -> PersistResult<usize> {
    let used: i64 = conn.query_row(
        "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) \
         FROM kv WHERE key <> ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(used).unwrap_or(0))
}
