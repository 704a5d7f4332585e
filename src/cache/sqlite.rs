// SqliteCacheStore: rusqlite backend implementing CacheStore.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Methods lock, do synchronous rusqlite work and return; the lock is never
// held across an .await.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::traits::CacheStore;

pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (or create) the cache database at `path` and create the table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory for cache database: {}", path.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        create_tables(&conn)?;

        Ok(Self::new(conn))
    }

    /// In-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        create_tables(&conn)?;
        Ok(Self::new(conn))
    }

    fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Number of cached runs.
    pub async fn entry_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count = conn.query_row("SELECT COUNT(*) FROM result_cache", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Create the cache table if it doesn't exist yet. Idempotent.
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per categorization run, keyed by the run's cache identity
        CREATE TABLE IF NOT EXISTS result_cache (
            cache_key TEXT PRIMARY KEY,
            payload BLOB NOT NULL,
            written_at TEXT NOT NULL
        );
        ",
    )
    .context("Failed to create cache tables")?;
    Ok(())
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().await;
        let payload = conn
            .query_row(
                "SELECT payload FROM result_cache WHERE cache_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let written_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO result_cache (cache_key, payload, written_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload = ?2,
                written_at = ?3",
            params![key, bytes, written_at],
        )?;
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM result_cache", [])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_overwrite() {
        let store = SqliteCacheStore::in_memory().unwrap();
        assert!(store.read("k").await.unwrap().is_none());

        store.write("k", b"first").await.unwrap();
        store.write("k", b"second").await.unwrap();
        assert_eq!(store.read("k").await.unwrap().unwrap(), b"second");
        assert_eq!(store.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.write("a", b"1").await.unwrap();
        store.write("b", b"2").await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.entry_count().await.unwrap(), 0);
    }
}
