// SQLite-backed cache store
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::{CacheEntry, CacheStore};
use crate::error::Result;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    stored_at INTEGER NOT NULL,
    ttl_ms INTEGER NOT NULL
)";

pub struct DatabaseStore {
    conn: Mutex<Connection>,
    max_size: usize,
}

impl DatabaseStore {
    pub fn open(path: &Path, max_size: usize) -> Result<Self> {
        Self::with_connection(Connection::open(path)?, max_size)
    }

    pub fn open_in_memory(max_size: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, max_size)
    }

    fn with_connection(conn: Connection, max_size: usize) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_size: max_size.max(1),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for DatabaseStore {
    fn name(&self) -> &'static str {
        "database"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT value, stored_at, ttl_ms FROM cache_entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((value, stored_at, ttl_ms)) => Ok(Some(CacheEntry {
                value: serde_json::from_str(&value)?,
                stored_at,
                ttl_ms: ttl_ms.max(0) as u64,
            })),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let value = serde_json::to_string(&entry.value)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        let count: i64 = tx.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        if count as usize >= self.max_size {
            // Oldest tenth by write time, at least one row.
            let evict = (count / 10).max(1);
            tx.execute(
                "DELETE FROM cache_entries WHERE key IN (
                    SELECT key FROM cache_entries ORDER BY stored_at ASC LIMIT ?1
                )",
                params![evict],
            )?;
        }
        tx.execute(
            "INSERT INTO cache_entries (key, value, stored_at, ttl_ms) VALUES (?1, ?2, ?3, ?4)",
            params![
                key,
                value,
                entry.stored_at,
                i64::try_from(entry.ttl_ms).unwrap_or(i64::MAX)
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn().execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
