// FileCacheStore: one JSON file per cache key inside a directory.
//
// Keys made of safe filename characters are used verbatim; anything else is
// replaced by its blake3 hash so a key can never escape the directory.
// Writes go to a temp file first and are renamed into place.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::traits::CacheStore;

const EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "tmp";

pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Use `dir` for cache files, creating it if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe = !key.is_empty()
            && key.len() <= 128
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let name = if safe {
            key.to_string()
        } else {
            blake3::hash(key.as_bytes()).to_hex().to_string()
        };
        self.dir.join(format!("{name}.{EXTENSION}"))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension(TMP_EXTENSION);
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move cache file into {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote cache file");
        Ok(())
    }

    /// Remove every cache file, plus temp files left by interrupted writes.
    /// Only cache entries count towards the returned total.
    async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_entry = match path.extension().and_then(|e| e.to_str()) {
                Some(EXTENSION) => true,
                Some(TMP_EXTENSION) => false,
                _ => continue,
            };
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            if is_entry {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_keys_used_verbatim() {
        let store = FileCacheStore {
            dir: PathBuf::from("/tmp/cache"),
        };
        assert_eq!(
            store.path_for("profissoes-2024"),
            PathBuf::from("/tmp/cache/profissoes-2024.json")
        );
    }

    #[test]
    fn test_unsafe_keys_are_hashed() {
        let store = FileCacheStore {
            dir: PathBuf::from("/tmp/cache"),
        };
        let path = store.path_for("../../etc/passwd");
        assert_eq!(path.parent(), Some(Path::new("/tmp/cache")));
        assert_eq!(path.file_stem().unwrap().len(), 64);
    }
}
