// Categorization pipeline: column in, one category per row out.
//
// The batch orchestrator drives a text column through the normalizer, the
// keyword stage and the semantic stage, with optional whole-run caching.
// Types shared with the cache and the output layer live here.

pub mod batch;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStatus;
use crate::semantic::classifier::DEFAULT_THRESHOLD;
use crate::variants::VariantRules;

pub use batch::{categorize_column, CacheHandle, Categorizer};

/// One input row: its position in the column and its raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRecord {
    pub index: usize,
    pub raw: String,
}

/// The category assigned to one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub index: usize,
    pub category: String,
}

/// Knobs for a categorization run.
#[derive(Debug, Clone)]
pub struct CategorizeOptions {
    /// Minimum cosine similarity for a semantic assignment.
    pub threshold: f64,
    /// Suffix rules used to expand the taxonomy.
    pub rules: VariantRules,
    /// Show indicatif progress bars on stderr.
    pub show_progress: bool,
    /// Label used in progress bars and logs (e.g. the column name).
    pub label: String,
}

impl Default for CategorizeOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            rules: VariantRules::default(),
            show_progress: false,
            label: "Categorizando".to_string(),
        }
    }
}

impl CategorizeOptions {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            anyhow::bail!(
                "Similarity threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            );
        }
        Ok(())
    }
}

/// Where each row's category came from, summed over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub rows: usize,
    /// Rows resolved by the keyword stage.
    pub keyword_matched: usize,
    /// Rows resolved by the semantic stage above threshold.
    pub semantic_matched: usize,
    /// Rows left in "Outros".
    pub unclassified: usize,
    /// Distinct normalized texts sent to the encoder.
    pub distinct_encoded: usize,
    pub cache: CacheStatus,
    pub cache_written: bool,
}

/// Output of a run: assignments in input order plus bookkeeping.
#[derive(Debug, Clone)]
pub struct ColumnResult {
    pub assignments: Vec<CategoryAssignment>,
    pub stats: RunStats,
}

impl ColumnResult {
    /// Just the labels, one per input row, in input order.
    pub fn labels(&self) -> Vec<&str> {
        self.assignments
            .iter()
            .map(|a| a.category.as_str())
            .collect()
    }

    /// (category, row count) pairs, most frequent first, ties by name.
    pub fn counts(&self) -> Vec<(String, usize)> {
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for a in &self.assignments {
            *counts.entry(a.category.as_str()).or_insert(0) += 1;
        }
        let mut counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(c, n)| (c.to_string(), n))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}
