//! `FastEmbed`-based multilingual embedder.
//!
//! Provides real semantic embeddings using a multilingual MiniLM model via
//! fastembed-rs, satisfying the requirement that the encoder cover
//! both English and German. Only compiled when `fastembed-embeddings` is
//! enabled.

use crate::Result;
use crate::embedding::{DEFAULT_DIMENSIONS, Embedder, MULTILINGUAL_ENCODER_NAME, normalize};
use crate::error::Error;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, OnceLock};

/// Process-lifetime singleton for the embedding model:
/// loaded once behind a `OnceLock`, a second concurrent load attempt blocks
/// on the existing lock rather than re-initializing the model.
static EMBEDDING_MODEL: OnceLock<Mutex<fastembed::TextEmbedding>> = OnceLock::new();

/// Multilingual sentence encoder, loaded lazily on first use.
pub struct FastEmbedEmbedder {
    name: &'static str,
}

impl FastEmbedEmbedder {
    /// Constructs the embedder handle. The underlying ONNX model is not
    /// loaded until the first call to [`Embedder::embed`].
    ///
    /// # Errors
    ///
    /// Never fails directly; model-load errors surface from the first
    /// `embed` call instead, so startup does not pay the download cost
    /// unless embeddings are actually requested.
    #[allow(clippy::missing_const_for_fn, clippy::unnecessary_wraps)]
    pub fn new() -> Result<Self> {
        Ok(Self {
            name: MULTILINGUAL_ENCODER_NAME,
        })
    }

    fn get_model() -> Result<&'static Mutex<fastembed::TextEmbedding>> {
        if let Some(model) = EMBEDDING_MODEL.get() {
            return Ok(model);
        }

        let options =
            fastembed::InitOptions::new(fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2)
                .with_show_download_progress(false);

        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| Error::Extraction(format!("loading embedding model: {e}")))?;

        let _ = EMBEDDING_MODEL.set(Mutex::new(model));
        EMBEDDING_MODEL
            .get()
            .ok_or_else(|| Error::Extraction("embedding model initialization race".to_string()))
    }
}

impl Embedder for FastEmbedEmbedder {
    fn name(&self) -> &str {
        self.name
    }

    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text])?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Extraction("no embedding returned from model".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Self::get_model()?;
        let mut model = model
            .lock()
            .map_err(|e| Error::Extraction(format!("embedding model lock poisoned: {e}")))?;

        // ONNX runtime can panic on malformed input; contain it so one bad
        // chunk does not take down the whole ingestion batch.
        let result = catch_unwind(AssertUnwindSafe(|| model.embed(texts.to_vec(), None)));

        let mut embeddings = result
            .map_err(|panic_info| {
                let message = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Error::Extraction(format!("embedding model panicked: {message}"))
            })?
            .map_err(|e| Error::Extraction(format!("embedding failed: {e}")))?;

        for vector in &mut embeddings {
            normalize(vector);
        }
        Ok(embeddings)
    }
}
