//! Abstract embedding provider interface
//!
//! The default (`fastembed`-backed) implementation lives behind the
//! `embeddings` feature; [`FallbackEmbeddingProvider`] below is a
//! deterministic, dependency-free provider used in tests and when the
//! feature is compiled out.

use async_trait::async_trait;

use crate::error::StorageError;

pub type EmbeddingResult<T> = std::result::Result<T, StorageError>;

/// Biases the model toward symmetric or asymmetric similarity. Mirrors the
/// query/document asymmetry many embedding models (e5, bge, nomic) expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    SearchQuery,
    SearchDocument,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_text(&self, text: &str, task_type: TaskType) -> EmbeddingResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String], task_type: TaskType) -> EmbeddingResult<Vec<Vec<f32>>>;

    fn get_dimension(&self) -> usize;
}

/// A hashing-based embedding provider with no model dependency. It is not
/// semantically meaningful beyond lexical overlap, but it is deterministic
/// and satisfies the trait's contract (fixed dimension, batch == repeated
/// single calls), which is all the scoring/fusion pipeline requires in
/// tests or when no ONNX model is bundled.
pub struct FallbackEmbeddingProvider {
    dimension: usize,
}

impl FallbackEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for FallbackEmbeddingProvider {
    fn default() -> Self {
        Self::new(128)
    }
}

fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut v = vec![0f32; dimension];
    for (i, token) in text.to_lowercase().split_whitespace().enumerate() {
        let mut hasher_state: u64 = 1469598103934665603;
        for b in token.bytes() {
            hasher_state ^= b as u64;
            hasher_state = hasher_state.wrapping_mul(1099511628211);
        }
        let slot = (hasher_state as usize) % dimension;
        v[slot] += 1.0 / (1.0 + i as f32 * 0.01);
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl EmbeddingProvider for FallbackEmbeddingProvider {
    async fn embed_text(&self, text: &str, _task_type: TaskType) -> EmbeddingResult<Vec<f32>> {
        Ok(hash_embed(text, self.dimension))
    }

    async fn embed_batch(&self, texts: &[String], task_type: TaskType) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed_text(t, task_type).await?);
        }
        Ok(out)
    }

    fn get_dimension(&self) -> usize {
        self.dimension
    }
}
