//! Lexical Index: a from-scratch BM25-Okapi scorer over
//! lowercased, whitespace-tokenized chunk text, plus [`rrf`] (C7's fusion
//! step) and [`vector`].
//!
//! Implemented standalone rather than delegated to a full-text-search
//! engine's built-in ranking so the tokenizer can be guaranteed
//! byte-for-byte identical to the chunker's — see [`crate::tokenize`].
//! The formula matches the reference `BM25Okapi` scorer: per-term IDF with
//! the epsilon floor for terms that would otherwise score negative.

pub mod rrf;
pub mod vector;

use crate::error::{Error, IndexError, Result};
use crate::model::Chunk;
use crate::tokenize::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_K1: f64 = 1.5;
const DEFAULT_B: f64 = 0.75;
const DEFAULT_EPSILON: f64 = 0.25;

/// Persistent BM25-Okapi index over a corpus of chunk texts, serialized
/// together with the chunk-id ordering so rank positions map back to
/// chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    /// Ordered chunk ids; index `i` here is document `i` below.
    chunk_ids: Vec<String>,
    /// Per-document term -> frequency.
    doc_term_freqs: Vec<HashMap<String, u32>>,
    /// Per-document token count.
    doc_lengths: Vec<usize>,
    /// Average document length across the corpus.
    avg_doc_length: f64,
    /// Per-term inverse document frequency.
    idf: HashMap<String, f64>,
    k1: f64,
    b: f64,
}

impl LexicalIndex {
    /// Builds a full index from `chunks`. Chunk order in `chunks` becomes
    /// the document ordering used to break ties in [`LexicalIndex::search`]
    /// is instead always by `chunk_id`, not build order.
    #[must_use]
    pub fn build(chunks: &[Chunk]) -> Self {
        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        let mut doc_term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lengths = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for chunk in chunks {
            let tokens = tokenize(&chunk.text);
            doc_lengths.push(tokens.len());
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_term_freqs.push(freqs);
        }

        let n_docs = chunks.len();
        let avg_doc_length = if n_docs == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let total: usize = doc_lengths.iter().sum();
            total as f64 / n_docs as f64
        };

        let mut idf: HashMap<String, f64> = HashMap::new();
        let mut idf_sum = 0.0;
        let mut negative_terms = Vec::new();
        #[allow(clippy::cast_precision_loss)]
        let n_docs_f = n_docs as f64;
        for (term, &freq) in &doc_freq {
            #[allow(clippy::cast_precision_loss)]
            let freq_f = freq as f64;
            let value = ((n_docs_f - freq_f + 0.5) / (freq_f + 0.5)).ln();
            idf.insert(term.clone(), value);
            idf_sum += value;
            if value < 0.0 {
                negative_terms.push(term.clone());
            }
        }
        if !idf.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let average_idf = idf_sum / idf.len() as f64;
            let epsilon_floor = DEFAULT_EPSILON * average_idf;
            for term in negative_terms {
                idf.insert(term, epsilon_floor);
            }
        }

        Self {
            chunk_ids,
            doc_term_freqs,
            doc_lengths,
            avg_doc_length,
            idf,
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }

    /// Returns the top-`k` `(chunk_id, score)` pairs for `query`, sorted
    /// descending by score, ties broken by chunk_id.
    #[must_use]
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, f64)> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || self.chunk_ids.is_empty() {
            return Vec::new();
        }

        let mut scores = vec![0.0f64; self.chunk_ids.len()];
        for term in &query_tokens {
            let Some(&term_idf) = self.idf.get(term) else {
                continue;
            };
            for (doc_idx, freqs) in self.doc_term_freqs.iter().enumerate() {
                let tf = f64::from(freqs.get(term).copied().unwrap_or(0));
                if tf == 0.0 {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let doc_len = self.doc_lengths[doc_idx] as f64;
                let denom = tf + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_length.max(1.0));
                scores[doc_idx] += term_idf * (tf * (self.k1 + 1.0)) / denom;
            }
        }

        let mut ranked: Vec<(String, f64)> = self
            .chunk_ids
            .iter()
            .cloned()
            .zip(scores)
            .filter(|(_, score)| *score > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }

    /// Number of documents in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    /// True iff the index has no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    /// Serializes the index to `path` as a single JSON artifact.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::IndexUnavailable`] wrapping [`IndexError::Io`] on
    /// write failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string(self).map_err(|e| IndexError::Io(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| IndexError::Io(e.to_string()))?;
        Ok(())
    }

    /// Loads a previously-saved index from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexUnavailable`] with [`IndexError::Missing`] if
    /// `path` does not exist, or [`IndexError::Io`] on a parse failure.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::IndexUnavailable(IndexError::Missing {
                path: path.display().to_string(),
            }));
        }
        let text = std::fs::read_to_string(path).map_err(|e| IndexError::Io(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| IndexError::Io(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocType;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            product_name: "Apple Watch Series 11".to_string(),
            doc_type: DocType::Specifications,
            page_num: 9,
            source_file: "specifications.pdf".to_string(),
            source_url: None,
            source_name: None,
            chunk_index: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn search_ranks_exact_term_match_first() {
        let chunks = vec![
            chunk("a", "the battery lasts eighteen hours on a single charge"),
            chunk("b", "the display is always-on and bright outdoors"),
            chunk("c", "battery battery battery charge charge"),
        ];
        let index = LexicalIndex::build(&chunks);
        let results = index.search("battery charge", 10);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, "c");
    }

    #[test]
    fn empty_query_returns_no_results() {
        let chunks = vec![chunk("a", "some text")];
        let index = LexicalIndex::build(&chunks);
        assert!(index.search("   ", 5).is_empty());
    }

    #[test]
    fn ties_are_broken_by_chunk_id() {
        let chunks = vec![chunk("z", "same same same"), chunk("a", "same same same")];
        let index = LexicalIndex::build(&chunks);
        let results = index.search("same", 10);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "z");
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexical.json");
        let chunks = vec![chunk("a", "eighteen hours battery life")];
        let index = LexicalIndex::build(&chunks);
        index.save(&path).unwrap();
        let loaded = LexicalIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.search("battery", 5), index.search("battery", 5));
    }

    #[test]
    fn load_missing_file_is_index_unavailable() {
        let result = LexicalIndex::load(Path::new("/nonexistent/lexical.json"));
        assert!(matches!(
            result,
            Err(Error::IndexUnavailable(IndexError::Missing { .. }))
        ));
    }
}
