// MemoryCacheStore: process-local cache, lost on exit.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::CacheStore;

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}
