//! SQLite-backed local storage.

use crate::error::{StorageError, StorageResult};
use crate::LocalStore;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Local storage in a single SQLite file.
#[derive(Clone)]
pub struct SqliteLocalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLocalStore {
    /// Opens or creates the store at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        debug!("opening local storage at {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))
    }
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS local_storage (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );",
    )?;
    Ok(())
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: &str) -> StorageResult<String> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so another process cannot
        // slip a write between our insert and read.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO NOTHING",
            params![key, value, Utc::now().timestamp_millis()],
        )?;
        let stored: String = tx.query_row(
            "SELECT value FROM local_storage WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        tx.commit()?;

        if inserted == 0 {
            debug!("set_if_absent: {key} already present, keeping existing value");
        }
        Ok(stored)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM local_storage ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}
