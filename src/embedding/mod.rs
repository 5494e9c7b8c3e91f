//! Embedder: maps chunk text to a fixed-dimension, unit-normalized
//! dense vector via a multilingual sentence encoder.
//!
//! The encoder identity (name + dimension) travels with the vector index
//! artifact; a mismatch at load time is fatal, not silently
//! re-embedded. With the `fastembed-embeddings` feature disabled, queries
//! still work end to end against a deterministic hash-based fallback
//! vectorizer, useful for tests and for builds that cannot fetch the ONNX
//! model at CI time.

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::HashEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use crate::error::Result;

/// The multilingual encoder name used when the real embedder is active.
/// Persisted alongside the vector index and checked against the
/// configured `embedder_name` at query time.
pub const MULTILINGUAL_ENCODER_NAME: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Embedding dimension produced by [`MULTILINGUAL_ENCODER_NAME`].
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators. Implementations must be thread-safe
/// (`Send + Sync`) since the embedder is shared across concurrent requests
/// ("Embedder calls must be thread-safe from the orchestrator's view").
pub trait Embedder: Send + Sync {
    /// The identity persisted with the vector index and checked at load time.
    fn name(&self) -> &str;

    /// Returns the embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Produces a unit-normalized embedding for `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails to run.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts. The default implementation calls
    /// [`Embedder::embed`] once per text; batching must not change the
    /// resulting vectors, only throughput.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails for any text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Constructs the default embedder for this build: the real multilingual
/// encoder when `fastembed-embeddings` is enabled, otherwise the
/// deterministic hash-based fallback.
///
/// # Errors
///
/// Returns an error if the real encoder fails to initialize (e.g. the
/// ONNX model cannot be downloaded or loaded).
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FastEmbedEmbedder::new()?))
}

/// Constructs the default embedder for this build (feature not enabled).
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(HashEmbedder::new(DEFAULT_DIMENSIONS)))
}

/// Unit-normalizes `vector` in place (L2 norm = 1), so cosine similarity
/// reduces to a dot product in the vector index.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two vectors of equal length.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
