// Test doubles shared by the integration tests: a table-driven encoder and
// cache stores that fail on purpose.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use categorizer::cache::CacheStore;
use categorizer::semantic::traits::Encoder;
use categorizer::taxonomy::Taxonomy;

pub const DIM: usize = 6;

/// Unit vector along `axis`.
pub fn axis(axis: usize) -> Vec<f64> {
    let mut v = vec![0.0; DIM];
    v[axis] = 1.0;
    v
}

/// Unit vector with cosine `similarity` to `axis(target)`, the remainder on
/// the last axis (which no taxonomy term uses).
pub fn near(target: usize, similarity: f64) -> Vec<f64> {
    let mut v = vec![0.0; DIM];
    v[target] = similarity;
    v[DIM - 1] = (1.0 - similarity * similarity).sqrt();
    v
}

/// Taxonomy used across the composition tests. Each category's terms embed
/// onto their own axis: Direito -> 0, Saude -> 1, Matematica -> 2.
pub fn survey_taxonomy() -> Taxonomy {
    Taxonomy::new(vec![
        ("Direito", vec!["advogado"]),
        ("Saude", vec!["enfermeiro"]),
        ("Matematica", vec!["matematica"]),
    ])
}

/// Encoder backed by a lookup table. Unknown texts get `fallback`, or an
/// error when `strict` is set. Every call is recorded.
pub struct LookupEncoder {
    table: HashMap<String, Vec<f64>>,
    fallback: Vec<f64>,
    strict: bool,
    batch_size: usize,
    calls: Mutex<Vec<Vec<String>>>,
}

impl LookupEncoder {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            fallback: axis(DIM - 1),
            strict: false,
            batch_size: 32,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Encoder that knows the expanded terms of `survey_taxonomy()`.
    pub fn for_survey() -> Self {
        Self::new()
            .with("advogado", axis(0))
            .with("advogados", axis(0))
            .with("enfermeiro", axis(1))
            .with("enfermeiros", axis(1))
            .with("matematica", axis(2))
            .with("matematicas", axis(2))
    }

    pub fn with(mut self, text: &str, vector: Vec<f64>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Every batch the encoder was called with, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Every text the encoder saw, flattened.
    pub fn seen(&self) -> Vec<String> {
        self.calls().into_iter().flatten().collect()
    }
}

#[async_trait]
impl Encoder for LookupEncoder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        self.calls.lock().unwrap().push(texts.to_vec());
        texts
            .iter()
            .map(|t| match self.table.get(t) {
                Some(v) => Ok(v.clone()),
                None if self.strict => anyhow::bail!("no embedding for {t:?}"),
                None => Ok(self.fallback.clone()),
            })
            .collect()
    }

    fn preferred_batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Encoder that always fails.
pub struct BrokenEncoder;

#[async_trait]
impl Encoder for BrokenEncoder {
    async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
        anyhow::bail!("model exploded")
    }
}

/// Encoder that drops the last vector of every batch.
pub struct ShortEncoder;

#[async_trait]
impl Encoder for ShortEncoder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(texts.iter().skip(1).map(|_| axis(0)).collect())
    }
}

/// Cache store whose reads and/or writes always fail.
pub struct FailingStore {
    pub fail_reads: bool,
    pub fail_writes: bool,
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_reads {
            anyhow::bail!("disk on fire");
        }
        Ok(None)
    }

    async fn write(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("disk full");
        }
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        Ok(0)
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
