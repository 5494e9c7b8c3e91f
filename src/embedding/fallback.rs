//! Deterministic hash-based embedder.
//!
//! Not semantically meaningful, but stable across runs and processes: the
//! same text always maps to the same vector. Used when `fastembed-embeddings`
//! is disabled, so retrieval and tests still exercise the full vector-search
//! path without fetching an ONNX model.

use crate::embedding::{Embedder, normalize};
use crate::error::Result;
use std::hash::{Hash, Hasher};

/// Name persisted with indexes built by this embedder; deliberately
/// distinct from [`crate::embedding::MULTILINGUAL_ENCODER_NAME`] so a build
/// cannot silently load an index produced by the other embedder.
pub const HASH_EMBEDDER_NAME: &str = "hash-fallback-v1";

/// Hash-based embedder: each dimension is a distinct hash seed applied to
/// overlapping token windows of the input, then the whole vector is
/// unit-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates a hash embedder producing vectors of `dimensions` length.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        HASH_EMBEDDER_NAME
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            for (dim, slot) in vector.iter_mut().enumerate() {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                dim.hash(&mut hasher);
                token.to_lowercase().hash(&mut hasher);
                let bucket = hasher.finish();
                #[allow(clippy::cast_precision_loss)]
                let signed = if bucket % 2 == 0 { 1.0 } else { -1.0 };
                *slot += signed * ((bucket % 1000) as f32 / 1000.0);
            }
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_yields_same_vector() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("battery life eighteen hours").unwrap();
        let b = embedder.embed("battery life eighteen hours").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_yields_different_vector() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("battery life eighteen hours").unwrap();
        let b = embedder.embed("gps tracking setup guide").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn vector_is_unit_normalized() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed("some chunk text to embed").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn respects_configured_dimensions() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.embed("x").unwrap().len(), 64);
        assert_eq!(embedder.dimensions(), 64);
    }
}
