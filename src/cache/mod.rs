// Result cache: whole-run categorization results keyed by the run's identity.
//
// A cache entry is the full ordered assignment list for one input column.
// Reading is a soft operation: a miss, a corrupt blob or a broken store all
// fall through to recomputation, but each is reported as a distinct
// CacheStatus so "nothing cached" and "cache is broken" can be told apart in
// the logs. Writing is best effort.

pub mod traits;
pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::CategoryAssignment;
use crate::taxonomy::Taxonomy;
use crate::variants::VariantRules;

pub use traits::CacheStore;

/// Bumped whenever the blob layout or the categorization semantics change,
/// so stale entries read back as corrupt instead of being trusted.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Identity of a cached run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Use a caller-chosen identity verbatim (e.g. a fixed name per dataset).
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Content hash over everything that determines the run's output: the
    /// raw texts, the taxonomy, the variant rules and the threshold.
    ///
    /// The encoder is not part of the hash. Clear the cache after switching
    /// models.
    pub fn for_run(
        texts: &[String],
        taxonomy: &Taxonomy,
        rules: &VariantRules,
        threshold: f64,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());

        hasher.update(&(texts.len() as u64).to_le_bytes());
        for text in texts {
            hasher.update(&(text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }

        hasher.update(taxonomy.to_json().to_string().as_bytes());
        // VariantRules only holds strings, serialization can't fail
        hasher.update(serde_json::to_string(rules).unwrap_or_default().as_bytes());
        hasher.update(&threshold.to_bits().to_le_bytes());

        Self(format!("run-{}", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened when the run tried to read its cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CacheStatus {
    /// No cache configured for this run.
    #[default]
    Disabled,
    /// Entry found and returned verbatim.
    Hit,
    /// No entry for this key.
    Miss,
    /// Entry found but unusable (bad JSON, wrong version, wrong row count).
    Corrupt(String),
    /// The store itself failed to answer.
    Unavailable(String),
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Disabled => write!(f, "disabled"),
            CacheStatus::Hit => write!(f, "hit"),
            CacheStatus::Miss => write!(f, "miss"),
            CacheStatus::Corrupt(reason) => write!(f, "corrupt ({reason})"),
            CacheStatus::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// On-disk form of a cached run.
#[derive(Debug, Serialize, Deserialize)]
struct CachedRun {
    version: u32,
    written_at: DateTime<Utc>,
    assignments: Vec<CategoryAssignment>,
}

/// Serialize assignments into a cache blob.
pub fn encode_blob(assignments: &[CategoryAssignment]) -> Result<Vec<u8>> {
    let run = CachedRun {
        version: CACHE_FORMAT_VERSION,
        written_at: Utc::now(),
        assignments: assignments.to_vec(),
    };
    serde_json::to_vec(&run).context("Failed to serialize cached run")
}

/// Parse a cache blob, checking version and that it covers `expected_rows`.
pub fn decode_blob(bytes: &[u8], expected_rows: usize) -> Result<Vec<CategoryAssignment>> {
    let run: CachedRun = serde_json::from_slice(bytes).context("Cache blob is not valid JSON")?;

    if run.version != CACHE_FORMAT_VERSION {
        anyhow::bail!(
            "cache format version {} (expected {})",
            run.version,
            CACHE_FORMAT_VERSION
        );
    }
    if run.assignments.len() != expected_rows {
        anyhow::bail!(
            "cached run has {} rows, input has {}",
            run.assignments.len(),
            expected_rows
        );
    }
    if run
        .assignments
        .iter()
        .enumerate()
        .any(|(i, a)| a.index != i)
    {
        anyhow::bail!("cached row indices are out of order");
    }

    Ok(run.assignments)
}

/// Try to load a cached run. Never fails: every problem becomes a status.
pub async fn read_cached(
    store: &dyn CacheStore,
    key: &CacheKey,
    expected_rows: usize,
) -> (CacheStatus, Option<Vec<CategoryAssignment>>) {
    let bytes = match store.read(key.as_str()).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            info!(key = %key, "Cache miss");
            return (CacheStatus::Miss, None);
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Cache read failed, recomputing");
            return (CacheStatus::Unavailable(e.to_string()), None);
        }
    };

    match decode_blob(&bytes, expected_rows) {
        Ok(assignments) => {
            info!(key = %key, rows = assignments.len(), "Cache hit");
            (CacheStatus::Hit, Some(assignments))
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Cached run is corrupt, recomputing");
            (CacheStatus::Corrupt(format!("{e:#}")), None)
        }
    }
}

/// Store a finished run. Returns whether the write succeeded; failures are
/// logged, never propagated.
pub async fn write_cached(
    store: &dyn CacheStore,
    key: &CacheKey,
    assignments: &[CategoryAssignment],
) -> bool {
    let bytes = match encode_blob(assignments) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to encode cached run");
            return false;
        }
    };

    match store.write(key.as_str(), &bytes).await {
        Ok(()) => {
            info!(key = %key, rows = assignments.len(), bytes = bytes.len(), "Cached run written");
            true
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Cache write failed");
            false
        }
    }
}
