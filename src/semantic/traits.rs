// Encoder trait: the swap-ready abstraction over the embedding model.
//
// The classifier only needs "text in, fixed-width vector out". The default
// implementation is the local ONNX SentenceEmbedder; tests plug in lookup
// tables, and a hosted embedding API could slot in the same way.

use anyhow::Result;
use async_trait::async_trait;

/// Default number of texts per encoder call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Trait for turning texts into embedding vectors. Async because most
/// encoders either call out over HTTP or offload CPU work to a blocking pool.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode a batch of texts, returning one vector per text in the same
    /// order. All vectors from one encoder have the same width.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    /// How many texts the encoder prefers per call. The classifier chunks its
    /// work to this width instead of calling once per text.
    fn preferred_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }
}
