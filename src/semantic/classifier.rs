// Semantic classifier: nearest category by maximum cosine similarity.
//
// Each category is represented by the embeddings of all its expanded terms
// (not a centroid), and an answer's score for a category is its best match
// against any one of those terms. The winning category must clear the
// similarity threshold, otherwise the answer falls into "Outros".

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::embeddings::cosine_similarity;
use super::traits::Encoder;
use crate::taxonomy::{Taxonomy, UNCLASSIFIED};
use crate::variants::{expand_taxonomy, ExpandedTaxonomy, VariantRules};

/// Default minimum similarity for a semantic assignment.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Term embeddings for one category.
#[derive(Debug, Clone)]
pub struct CategoryEmbeddings {
    pub name: String,
    pub terms: Vec<String>,
    pub vectors: Vec<Vec<f64>>,
}

/// Category -> one embedding per expanded term, in taxonomy order.
///
/// Built once per taxonomy version and reused across batches.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    categories: Vec<CategoryEmbeddings>,
}

impl EmbeddingIndex {
    /// Assemble an index from precomputed vectors (e.g. loaded from disk).
    pub fn from_parts(categories: Vec<CategoryEmbeddings>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[CategoryEmbeddings] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Highest-scoring category for `vector` whose max similarity is at least
    /// `threshold`, with that score.
    ///
    /// On an exact tie the category that comes first in taxonomy order keeps
    /// the win. Nothing principled about that; taxonomies are expected to keep
    /// categories far enough apart that ties don't happen in practice.
    pub fn best_category(&self, vector: &[f64], threshold: f64) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;

        for category in &self.categories {
            let score = category
                .vectors
                .iter()
                .map(|v| cosine_similarity(vector, v))
                .fold(f64::NEG_INFINITY, f64::max);

            if score < threshold {
                continue;
            }
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((category.name.as_str(), score));
            }
        }

        best
    }
}

/// Encode `texts` in chunks of the encoder's preferred width, checking the
/// encoder returns exactly one vector per text.
pub async fn encode_in_batches(encoder: &dyn Encoder, texts: &[String]) -> Result<Vec<Vec<f64>>> {
    let batch_size = encoder.preferred_batch_size().max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for (i, chunk) in texts.chunks(batch_size).enumerate() {
        let encoded = encoder
            .encode(chunk)
            .await
            .with_context(|| format!("Encoder failed on batch {} ({} texts)", i, chunk.len()))?;

        if encoded.len() != chunk.len() {
            anyhow::bail!(
                "Encoder returned {} vectors for {} texts",
                encoded.len(),
                chunk.len()
            );
        }

        debug!(batch = i, texts = chunk.len(), "Encoded batch");
        vectors.extend(encoded);
    }

    Ok(vectors)
}

/// Embed every expanded term of every category.
pub async fn build_index(expanded: &ExpandedTaxonomy, encoder: &dyn Encoder) -> Result<EmbeddingIndex> {
    let all_terms: Vec<String> = expanded
        .categories()
        .iter()
        .flat_map(|(_, terms)| terms.iter().cloned())
        .collect();

    let mut vectors = encode_in_batches(encoder, &all_terms)
        .await
        .context("Failed to embed taxonomy terms")?
        .into_iter();

    let categories = expanded
        .categories()
        .iter()
        .map(|(name, terms)| CategoryEmbeddings {
            name: name.clone(),
            terms: terms.clone(),
            vectors: vectors.by_ref().take(terms.len()).collect(),
        })
        .collect();

    info!(
        categories = expanded.len(),
        terms = all_terms.len(),
        "Built category embedding index"
    );

    Ok(EmbeddingIndex { categories })
}

/// Expand the taxonomy and embed every expanded term once.
pub async fn prepare(
    taxonomy: &Taxonomy,
    rules: &VariantRules,
    encoder: &dyn Encoder,
) -> Result<(ExpandedTaxonomy, EmbeddingIndex)> {
    let expanded = expand_taxonomy(taxonomy, rules);
    let index = build_index(&expanded, encoder).await?;
    Ok((expanded, index))
}

/// Classify unresolved texts by embedding similarity.
///
/// Each distinct text is encoded once, however many rows share it. Blank
/// texts never reach the encoder and map straight to "Outros". The returned
/// map has an entry for every distinct input text.
pub async fn classify_batch(
    texts: &[String],
    index: &EmbeddingIndex,
    encoder: &dyn Encoder,
    threshold: f64,
) -> Result<HashMap<String, String>> {
    let mut result: HashMap<String, String> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique: Vec<String> = Vec::new();

    for text in texts {
        if !seen.insert(text.as_str()) {
            continue;
        }
        if text.trim().is_empty() {
            result.insert(text.clone(), UNCLASSIFIED.to_string());
        } else {
            unique.push(text.clone());
        }
    }

    if unique.is_empty() {
        return Ok(result);
    }

    let vectors = encode_in_batches(encoder, &unique)
        .await
        .context("Failed to embed unresolved answers")?;

    let mut resolved = 0usize;
    for (text, vector) in unique.into_iter().zip(vectors) {
        let category = match index.best_category(&vector, threshold) {
            Some((name, _score)) => {
                resolved += 1;
                name.to_string()
            }
            None => UNCLASSIFIED.to_string(),
        };
        result.insert(text, category);
    }

    info!(
        distinct = result.len(),
        resolved,
        threshold,
        "Semantic classification complete"
    );

    Ok(result)
}
