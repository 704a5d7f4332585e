// Semantic stage: embedding-similarity fallback for answers with no keyword hit.

pub mod traits;
pub mod embeddings;
pub mod classifier;
