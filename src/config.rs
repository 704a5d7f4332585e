use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::semantic::classifier::DEFAULT_THRESHOLD;
use crate::semantic::embeddings::{model_files_present, DEFAULT_MAX_TOKENS};
use crate::semantic::traits::DEFAULT_BATCH_SIZE;
use crate::variants::VariantRules;

/// Default sentence-transformer directory name under the model root.
pub const DEFAULT_MODEL_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Which result cache backend to use.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheBackend {
    /// SQLite database file (default when built with the `sqlite` feature)
    Sqlite,
    /// One JSON file per cached run inside a directory
    File,
    /// No caching
    Off,
}

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded at startup via dotenvy; every value has a default
/// so the CLI works with no configuration beyond the model directory.
pub struct Config {
    /// Directory containing model.onnx and tokenizer.json
    pub model_dir: PathBuf,
    /// Minimum cosine similarity for a semantic assignment
    pub threshold: f64,
    /// Texts per encoder forward pass
    pub batch_size: usize,
    /// Token limit per answer; longer answers are truncated before encoding
    pub max_tokens: usize,
    pub cache_backend: CacheBackend,
    pub cache_path: PathBuf,
    /// Optional JSON file overriding the default Portuguese suffix rules
    pub rules_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model_dir = var("CATEGORIZER_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_model_dir);

        let threshold = match var("CATEGORIZER_THRESHOLD") {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .with_context(|| format!("CATEGORIZER_THRESHOLD is not a number: {raw:?}"))?,
            None => DEFAULT_THRESHOLD,
        };
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("CATEGORIZER_THRESHOLD must be between 0.0 and 1.0, got {threshold}");
        }

        let batch_size = match var("CATEGORIZER_BATCH_SIZE") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("CATEGORIZER_BATCH_SIZE is not a number: {raw:?}"))?,
            None => DEFAULT_BATCH_SIZE,
        };
        if batch_size == 0 {
            anyhow::bail!("CATEGORIZER_BATCH_SIZE must be greater than zero");
        }

        let max_tokens = match var("CATEGORIZER_MAX_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("CATEGORIZER_MAX_TOKENS is not a number: {raw:?}"))?,
            None => DEFAULT_MAX_TOKENS,
        };
        if max_tokens == 0 {
            anyhow::bail!("CATEGORIZER_MAX_TOKENS must be greater than zero");
        }

        let cache_backend = match var("CATEGORIZER_CACHE").as_deref() {
            Some("off") | Some("none") => CacheBackend::Off,
            Some("file") => CacheBackend::File,
            Some("sqlite") => CacheBackend::Sqlite,
            Some(other) => anyhow::bail!(
                "Unknown CATEGORIZER_CACHE value {other:?} (expected sqlite, file or off)"
            ),
            None if cfg!(feature = "sqlite") => CacheBackend::Sqlite,
            None => CacheBackend::File,
        };

        let cache_path = var("CATEGORIZER_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| match cache_backend {
                CacheBackend::File => PathBuf::from("./categorizer-cache"),
                _ => PathBuf::from("./categorizer-cache.db"),
            });

        Ok(Self {
            model_dir,
            threshold,
            batch_size,
            max_tokens,
            cache_backend,
            cache_path,
            rules_path: var("CATEGORIZER_RULES").map(PathBuf::from),
        })
    }

    /// Check the embedding model files are in place.
    pub fn require_model(&self) -> Result<()> {
        if !model_files_present(&self.model_dir) {
            anyhow::bail!(
                "Sentence embedding model not found in {}\n\
                 Place model.onnx and tokenizer.json there, or set CATEGORIZER_MODEL_DIR\n\
                 to a directory that has them.",
                self.model_dir.display()
            );
        }
        Ok(())
    }

    /// The variant rules to use: the configured file, or the Portuguese defaults.
    pub fn variant_rules(&self) -> Result<VariantRules> {
        match &self.rules_path {
            Some(path) => VariantRules::load(path),
            None => Ok(VariantRules::default()),
        }
    }
}

/// Platform data directory: ~/.local/share/categorizer/models/<model> on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("categorizer")
        .join("models")
        .join(DEFAULT_MODEL_NAME)
}
