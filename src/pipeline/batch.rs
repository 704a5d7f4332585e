// Batch orchestrator: cache -> normalize -> keyword -> semantic -> merge -> cache.
//
// The flow for one column:
// 1. Return a cached run verbatim if one exists for this key
// 2. Normalize every answer
// 3. Expand the taxonomy and compile the keyword automaton (Categorizer::prepare)
// 4. Keyword pass over every row
// 5. Deduplicate rows the keyword pass missed, classify the distinct texts
//    semantically, broadcast each result back to every row sharing the text
// 6. Store the run in the cache (best effort)
//
// No single row can fail the batch. The only hard failures are an invalid
// taxonomy or options (checked before any row is touched) and encoder errors.

use std::collections::HashSet;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::{CategorizeOptions, CategoryAssignment, ColumnResult, RunStats, TextRecord};
use crate::cache::{self, CacheKey, CacheStatus, CacheStore};
use crate::keywords::KeywordMatcher;
use crate::normalize::normalize;
use crate::semantic::classifier::{self, EmbeddingIndex};
use crate::semantic::traits::Encoder;
use crate::taxonomy::{Taxonomy, UNCLASSIFIED};
use crate::variants::{ExpandedTaxonomy, VariantRules};

/// A cache store plus the key this run reads and writes.
pub struct CacheHandle<'a> {
    pub store: &'a dyn CacheStore,
    pub key: CacheKey,
}

/// A prepared engine: expanded taxonomy, compiled keyword matcher and
/// category embeddings. Build once per taxonomy version, then categorize as
/// many columns as needed.
pub struct Categorizer {
    expanded: ExpandedTaxonomy,
    matcher: KeywordMatcher,
    index: EmbeddingIndex,
}

impl Categorizer {
    /// Validate the taxonomy, expand it, compile the matcher and embed every
    /// expanded term.
    pub async fn prepare(
        taxonomy: &Taxonomy,
        rules: &VariantRules,
        encoder: &dyn Encoder,
    ) -> Result<Self> {
        taxonomy.validate()?;

        let (expanded, index) = classifier::prepare(taxonomy, rules, encoder).await?;
        let matcher = KeywordMatcher::compile(&expanded)?;

        info!(
            categories = expanded.len(),
            terms = expanded.term_count(),
            patterns = matcher.len(),
            "Categorizer ready"
        );

        Ok(Self {
            expanded,
            matcher,
            index,
        })
    }

    /// Assemble from an expanded taxonomy and an index built elsewhere.
    pub fn from_parts(expanded: ExpandedTaxonomy, index: EmbeddingIndex) -> Result<Self> {
        if expanded.is_empty() {
            anyhow::bail!("Expanded taxonomy has no categories");
        }
        let matcher = KeywordMatcher::compile(&expanded)?;
        Ok(Self {
            expanded,
            matcher,
            index,
        })
    }

    pub fn expanded(&self) -> &ExpandedTaxonomy {
        &self.expanded
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Categorize a column, consulting the cache first when one is given.
    pub async fn categorize(
        &self,
        texts: &[String],
        encoder: &dyn Encoder,
        options: &CategorizeOptions,
        cache: Option<&CacheHandle<'_>>,
    ) -> Result<ColumnResult> {
        options.validate()?;

        let status = match lookup(cache, texts.len()).await {
            Lookup::Hit(result) => return Ok(result),
            Lookup::Fallthrough(status) => status,
        };

        let mut result = self.run(texts, encoder, options).await?;
        result.stats.cache = status;
        result.stats.cache_written = store(cache, &result.assignments).await;
        Ok(result)
    }

    /// The uncached pipeline: normalize, keyword pass, semantic pass, merge.
    async fn run(
        &self,
        texts: &[String],
        encoder: &dyn Encoder,
        options: &CategorizeOptions,
    ) -> Result<ColumnResult> {
        let records: Vec<TextRecord> = texts
            .iter()
            .enumerate()
            .map(|(index, raw)| TextRecord {
                index,
                raw: raw.clone(),
            })
            .collect();

        let normalized: Vec<String> = records.iter().map(|r| normalize(&r.raw)).collect();

        // Keyword pass
        let pb = progress_bar(normalized.len(), options);
        let mut categories: Vec<Option<String>> = Vec::with_capacity(normalized.len());
        for text in &normalized {
            categories.push(self.matcher.find(text).map(str::to_string));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let keyword_matched = categories.iter().filter(|c| c.is_some()).count();

        // Semantic pass over distinct unresolved texts
        let mut seen: HashSet<&str> = HashSet::new();
        let unresolved: Vec<String> = normalized
            .iter()
            .zip(&categories)
            .filter(|(_, c)| c.is_none())
            .filter(|(t, _)| seen.insert(t.as_str()))
            .map(|(t, _)| t.clone())
            .collect();
        let distinct_encoded = unresolved.iter().filter(|t| !t.trim().is_empty()).count();

        info!(
            label = %options.label,
            rows = records.len(),
            keyword_matched,
            distinct_unresolved = unresolved.len(),
            "Keyword pass complete"
        );

        let semantic =
            classifier::classify_batch(&unresolved, &self.index, encoder, options.threshold)
                .await?;

        // Merge back in input order
        let mut semantic_matched = 0;
        let mut unclassified = 0;
        let assignments: Vec<CategoryAssignment> = records
            .iter()
            .zip(categories)
            .map(|(record, keyword_category)| {
                let category = match keyword_category {
                    Some(c) => c,
                    None => {
                        let c = semantic
                            .get(&normalized[record.index])
                            .cloned()
                            .unwrap_or_else(|| UNCLASSIFIED.to_string());
                        if c == UNCLASSIFIED {
                            unclassified += 1;
                        } else {
                            semantic_matched += 1;
                        }
                        c
                    }
                };
                CategoryAssignment {
                    index: record.index,
                    category,
                }
            })
            .collect();

        let stats = RunStats {
            rows: assignments.len(),
            keyword_matched,
            semantic_matched,
            unclassified,
            distinct_encoded,
            cache: CacheStatus::Disabled,
            cache_written: false,
        };

        info!(
            label = %options.label,
            rows = stats.rows,
            keyword = stats.keyword_matched,
            semantic = stats.semantic_matched,
            unclassified = stats.unclassified,
            "Categorization complete"
        );

        Ok(ColumnResult { assignments, stats })
    }
}

/// Categorize one text column against a taxonomy.
///
/// Validates the taxonomy and options, returns a cached run verbatim when one
/// exists, otherwise prepares a Categorizer, runs it and caches the result.
/// Prefer `Categorizer::prepare` + `Categorizer::categorize` when the same
/// taxonomy is applied to several columns; this function re-embeds the
/// taxonomy on every call that misses the cache.
pub async fn categorize_column(
    texts: &[String],
    taxonomy: &Taxonomy,
    encoder: &dyn Encoder,
    options: &CategorizeOptions,
    cache: Option<&CacheHandle<'_>>,
) -> Result<ColumnResult> {
    taxonomy.validate()?;
    options.validate()?;

    let status = match lookup(cache, texts.len()).await {
        Lookup::Hit(result) => return Ok(result),
        Lookup::Fallthrough(status) => status,
    };

    let categorizer = Categorizer::prepare(taxonomy, &options.rules, encoder).await?;
    let mut result = categorizer.run(texts, encoder, options).await?;
    result.stats.cache = status;
    result.stats.cache_written = store(cache, &result.assignments).await;
    Ok(result)
}

enum Lookup {
    Hit(ColumnResult),
    Fallthrough(CacheStatus),
}

async fn lookup(cache: Option<&CacheHandle<'_>>, rows: usize) -> Lookup {
    let Some(handle) = cache else {
        return Lookup::Fallthrough(CacheStatus::Disabled);
    };

    match cache::read_cached(handle.store, &handle.key, rows).await {
        (status, Some(assignments)) => {
            let stats = stats_from_cached(&assignments, status);
            Lookup::Hit(ColumnResult { assignments, stats })
        }
        (status, None) => Lookup::Fallthrough(status),
    }
}

async fn store(cache: Option<&CacheHandle<'_>>, assignments: &[CategoryAssignment]) -> bool {
    match cache {
        Some(handle) => cache::write_cached(handle.store, &handle.key, assignments).await,
        None => false,
    }
}

/// A cached run doesn't record which stage resolved each row, only the
/// final labels.
fn stats_from_cached(assignments: &[CategoryAssignment], status: CacheStatus) -> RunStats {
    let unclassified = assignments
        .iter()
        .filter(|a| a.category == UNCLASSIFIED)
        .count();
    RunStats {
        rows: assignments.len(),
        unclassified,
        cache: status,
        ..RunStats::default()
    }
}

fn progress_bar(len: usize, options: &CategorizeOptions) -> ProgressBar {
    if !options.show_progress {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    let template = format!("  {} (keywords) [{{bar:30}}] {{pos}}/{{len}} ({{eta}})", options.label);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}
