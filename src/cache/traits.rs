// Cache store trait: opaque key/value byte storage for categorization runs.
//
// Implementors: FileCacheStore (one file per key), SqliteCacheStore (rusqlite,
// behind the `sqlite` feature) and MemoryCacheStore. The orchestrator only
// ever reads once at the start of a run and writes once at the end.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the bytes stored under `key`. `Ok(None)` is a plain miss; `Err`
    /// means the store itself failed.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any previous value.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove every entry, returning how many were removed.
    async fn clear(&self) -> Result<usize>;
}
