// Sentence embeddings via a local ONNX sentence-transformer.
//
// Answers that share no characters with any taxonomy term ("trabalho com
// numeros" vs. "Matematica") still land near each other in embedding space.
// The default model is paraphrase-multilingual-MiniLM-L12-v2 because survey
// answers are Portuguese; any BERT-style sentence-transformer exported to ONNX
// with `input_ids` / `attention_mask` / `token_type_ids` inputs works.
//
// The model is never downloaded here. The caller points us at a directory
// that already contains `model.onnx` and `tokenizer.json`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::traits::{Encoder, DEFAULT_BATCH_SIZE};

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Longest token sequence fed to the model. Matches the `max_seq_length` the
/// default MiniLM was trained with; longer answers are truncated.
pub const DEFAULT_MAX_TOKENS: usize = 128;

/// Check whether both model files exist in `dir`.
pub fn model_files_present(dir: &Path) -> bool {
    dir.join(MODEL_FILE).exists() && dir.join(TOKENIZER_FILE).exists()
}

/// Sentence embedder using a local ONNX model.
///
/// Arc<Mutex<Session>> because `Session::run` takes `&mut self` and inference
/// is moved onto `spawn_blocking`, which needs `'static` handles.
pub struct SentenceEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    batch_size: usize,
}

impl SentenceEmbedder {
    /// Load the sentence embedding model and tokenizer from `model_dir`.
    ///
    /// The tokenizer truncates to at most `max_tokens`, keeping a tighter
    /// limit if `tokenizer.json` already carries one, so an arbitrarily long
    /// answer never exceeds the model's position embeddings.
    pub fn load(model_dir: &Path, max_tokens: usize) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Embedding model not found: {}\nSet CATEGORIZER_MODEL_DIR to a directory containing {} and {}.",
                model_path.display(),
                MODEL_FILE,
                TOKENIZER_FILE
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Embedding tokenizer not found: {}\nSet CATEGORIZER_MODEL_DIR to a directory containing {} and {}.",
                tokenizer_path.display(),
                MODEL_FILE,
                TOKENIZER_FILE
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!(
                    "Failed to load embedding model from {}",
                    model_path.display()
                )
            })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load embedding tokenizer: {}", e))?;

        if let Some(params) = capped_truncation(tokenizer.get_truncation(), max_tokens) {
            tokenizer
                .with_truncation(Some(params))
                .map_err(|e| anyhow::anyhow!("Invalid tokenizer truncation: {}", e))?;
        }

        debug!(
            max_tokens,
            "Loaded sentence embedding model from {}",
            model_dir.display()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Override how many texts go through the model per forward pass.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl Encoder for SentenceEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || embed_sync(&session, &tokenizer, &texts))
            .await
            .context("spawn_blocking panicked")?
    }

    fn preferred_batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Truncation to install on a tokenizer so no sequence exceeds `max_tokens`.
/// `None` when the existing setting is already at least that strict.
fn capped_truncation(
    existing: Option<&TruncationParams>,
    max_tokens: usize,
) -> Option<TruncationParams> {
    let max_tokens = max_tokens.max(1);
    match existing {
        Some(params) if params.max_length <= max_tokens => None,
        Some(params) => Some(TruncationParams {
            max_length: max_tokens,
            ..params.clone()
        }),
        None => Some(TruncationParams {
            max_length: max_tokens,
            ..TruncationParams::default()
        }),
    }
}

/// Token ids, attention mask and token types for one batch, right-padded to
/// the longest sequence and flattened row-major.
struct PaddedBatch {
    rows: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
}

impl PaddedBatch {
    fn from_encodings(encodings: &[tokenizers::Encoding], pad_id: i64) -> Self {
        let rows = encodings.len();
        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let cells = rows * seq_len;

        let mut batch = Self {
            rows,
            seq_len,
            input_ids: Vec::with_capacity(cells),
            attention_mask: Vec::with_capacity(cells),
            token_type_ids: vec![0; cells],
        };

        for enc in encodings {
            let pad = seq_len - enc.len();
            batch
                .input_ids
                .extend(enc.get_ids().iter().map(|&id| i64::from(id)));
            batch.input_ids.extend(std::iter::repeat_n(pad_id, pad));
            batch
                .attention_mask
                .extend(enc.get_attention_mask().iter().map(|&m| i64::from(m)));
            batch.attention_mask.extend(std::iter::repeat_n(0, pad));
        }

        batch
    }

    fn shape(&self) -> [i64; 2] {
        [self.rows as i64, self.seq_len as i64]
    }
}

/// Tokenize, run one forward pass and mean-pool over the attention mask.
fn embed_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    texts: &[String],
) -> Result<Vec<Vec<f64>>> {
    let encodings = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed for {t:?}: {e}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let pad_id = tokenizer.get_padding().map_or(0, |p| i64::from(p.pad_id));
    let batch = PaddedBatch::from_encodings(&encodings, pad_id);
    if batch.seq_len == 0 {
        anyhow::bail!("Tokenizer produced no tokens for a batch of {} texts", batch.rows);
    }

    let shape = batch.shape();
    let input_ids = Tensor::from_array((shape, batch.input_ids))
        .context("Failed to create input_ids tensor")?;
    let attention_mask = Tensor::from_array((shape, batch.attention_mask.clone()))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids = Tensor::from_array((shape, batch.token_type_ids))
        .context("Failed to create token_type_ids tensor")?;

    // last_hidden_state: [rows, seq_len, hidden]
    let (dims, hidden) = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            })
            .context("Embedding ONNX inference failed")?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract embedding output tensor")?;

        (shape.to_vec(), data.to_vec())
    };

    let embeddings = mean_pool(
        &hidden,
        &dims,
        &batch.attention_mask,
        batch.rows,
        batch.seq_len,
    )?;
    debug!(
        rows = batch.rows,
        seq_len = batch.seq_len,
        dim = embeddings.first().map_or(0, Vec::len),
        "Computed sentence embeddings"
    );
    Ok(embeddings)
}

/// Average each row's token vectors, counting only positions the mask keeps.
///
/// `hidden` is the flattened model output and `dims` its shape, which must be
/// `[rows, seq_len, dim]` (token states, not an already pooled `[rows, dim]`
/// output). A row with an all-zero mask pools to the zero vector.
fn mean_pool(
    hidden: &[f32],
    dims: &[i64],
    mask: &[i64],
    rows: usize,
    seq_len: usize,
) -> Result<Vec<Vec<f64>>> {
    let dim = match dims {
        [r, s, d] if *r == rows as i64 && *s == seq_len as i64 && *d > 0 => *d as usize,
        _ => anyhow::bail!(
            "Expected token embeddings shaped [{}, {}, dim], model returned {:?}",
            rows,
            seq_len,
            dims
        ),
    };
    let cells = rows * seq_len;
    if cells == 0 || hidden.len() != cells * dim || mask.len() != cells {
        anyhow::bail!(
            "Embedding output has {} values, expected {}x{}x{}",
            hidden.len(),
            rows,
            seq_len,
            dim
        );
    }

    let pooled = (0..rows)
        .map(|row| {
            let mut acc = vec![0.0_f64; dim];
            let mut kept = 0.0_f64;

            for pos in 0..seq_len {
                let cell = row * seq_len + pos;
                let weight = mask[cell] as f64;
                if weight <= 0.0 {
                    continue;
                }
                kept += weight;
                let token = &hidden[cell * dim..(cell + 1) * dim];
                for (a, &h) in acc.iter_mut().zip(token) {
                    *a += f64::from(h) * weight;
                }
            }

            if kept > 0.0 {
                acc.iter_mut().for_each(|a| *a /= kept);
            }
            acc
        })
        .collect();

    Ok(pooled)
}

/// Cosine similarity between two embedding vectors, in -1.0..=1.0.
///
/// Opposite vectors score negative, so they stay below a threshold of 0.0.
/// Mismatched lengths, empty vectors and zero vectors all score 0.0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    let denom = mag_a * mag_b;
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}
