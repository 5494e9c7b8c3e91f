//! Hybrid Retriever: fuses lexical and vector search into one ranked,
//! product-diverse candidate list.

pub mod analyzer;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::model::{Chunk, QueryAnalysis, RetrievalResult};
use crate::search::rrf::{RrfConfig, reciprocal_rank_fusion};
use crate::search::vector::VectorIndex;
use crate::search::LexicalIndex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Holds the collaborators the hybrid retriever needs for every request:
/// the read-only lexical index, the vector index, the embedder used to
/// vectorize the question, and the full chunk-id → [`Chunk`] map used to
/// resolve payloads and product names for both search arms.
pub struct HybridRetriever {
    lexical: Arc<LexicalIndex>,
    vector: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chunks: Arc<HashMap<String, Chunk>>,
    retrieve_k: usize,
    rrf_config: RrfConfig,
    retrieval_deadline: Duration,
}

impl HybridRetriever {
    /// Builds a retriever over already-loaded indexes.
    #[must_use]
    pub fn new(
        lexical: Arc<LexicalIndex>,
        vector: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunks: Arc<HashMap<String, Chunk>>,
        retrieve_k: usize,
        rrf_config: RrfConfig,
        retrieval_deadline: Duration,
    ) -> Self {
        Self {
            lexical,
            vector,
            embedder,
            chunks,
            retrieve_k,
            rrf_config,
            retrieval_deadline,
        }
    }

    /// Runs BM25 and vector search concurrently, fuses them with RRF,
    /// applies the product filter and diversity enforcement, and returns the
    /// final ordered candidate list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetrievalTimeout`] if the soft deadline elapses, or
    /// [`Error::Retrieval`] if both search arms fail or return nothing.
    pub async fn retrieve(&self, question: &str, analysis: &QueryAnalysis) -> Result<Vec<RetrievalResult>> {
        match tokio::time::timeout(self.retrieval_deadline, self.retrieve_inner(question, analysis)).await {
            Ok(result) => result,
            Err(_) => Err(Error::RetrievalTimeout),
        }
    }

    async fn retrieve_inner(&self, question: &str, analysis: &QueryAnalysis) -> Result<Vec<RetrievalResult>> {
        let lexical_task = {
            let lexical = Arc::clone(&self.lexical);
            let question = question.to_string();
            let k = self.retrieve_k;
            tokio::task::spawn_blocking(move || lexical.search(&question, k))
        };

        let vector_task = {
            let vector = Arc::clone(&self.vector);
            let embedder = Arc::clone(&self.embedder);
            let question = question.to_string();
            let k = self.retrieve_k;
            tokio::task::spawn_blocking(move || -> Result<Vec<(Chunk, f32)>> {
                let query_vec = embedder.embed(&question).map_err(|e| Error::Retrieval(format!("embedding question: {e}")))?;
                Ok(vector.search(&query_vec, k))
            })
        };

        let (lexical_result, vector_result) = tokio::join!(lexical_task, vector_task);
        let lexical_hits = lexical_result.map_err(|e| Error::Retrieval(e.to_string()))?;
        let vector_hits = vector_result.map_err(|e| Error::Retrieval(e.to_string()))??;

        if lexical_hits.is_empty() && vector_hits.is_empty() {
            return Err(Error::Retrieval("both lexical and vector search returned no candidates".to_string()));
        }

        tracing::debug!(
            lexical_count = lexical_hits.len(),
            vector_count = vector_hits.len(),
            "hybrid retrieval candidates before fusion"
        );

        let single_target = (analysis.target_products.len() == 1).then(|| analysis.target_products.iter().next().cloned().unwrap_or_default());

        let lexical_ids: Vec<String> = lexical_hits
            .into_iter()
            .filter(|(id, _)| self.passes_product_filter(id, single_target.as_deref()))
            .map(|(id, _)| id)
            .collect();

        let vector_ids: Vec<String> = vector_hits
            .into_iter()
            .filter(|(chunk, _)| single_target.as_deref().is_none_or(|target| chunk.product_name == target))
            .map(|(chunk, _)| chunk.chunk_id)
            .collect();

        let fused = reciprocal_rank_fusion(&[&lexical_ids, &vector_ids], &self.rrf_config);
        if fused.is_empty() {
            return Err(Error::Retrieval("no candidates survived the product filter".to_string()));
        }

        tracing::debug!(fused_top_40 = ?fused.iter().take(40).map(|(id, _)| id.clone()).collect::<Vec<_>>(), "fused candidates before diversity enforcement");

        let fused_score: HashMap<&str, f64> = fused.iter().map(|(id, score)| (id.as_str(), *score)).collect();
        let mut selected: Vec<String> = fused.iter().take(analysis.top_k).map(|(id, _)| id.clone()).collect();

        if analysis.diversity_enabled {
            selected = self.enforce_diversity(&fused, selected, analysis);
        }

        Ok(selected
            .into_iter()
            .filter_map(|id| {
                let chunk = self.chunks.get(&id)?.clone();
                let score = fused_score.get(id.as_str()).copied().unwrap_or(0.0);
                Some(RetrievalResult { chunk, fused_score: score })
            })
            .collect())
    }

    fn passes_product_filter(&self, chunk_id: &str, single_target: Option<&str>) -> bool {
        let Some(target) = single_target else {
            return true;
        };
        self.chunks.get(chunk_id).is_some_and(|chunk| chunk.product_name == target)
    }

    fn product_of(&self, chunk_id: &str) -> Option<String> {
        self.chunks.get(chunk_id).map(|c| c.product_name.clone())
    }

    /// Applies the swap-based product-diversity floor enforcement
    /// step 7.
    fn enforce_diversity(&self, fused: &[(String, f64)], mut selected: Vec<String>, analysis: &QueryAnalysis) -> Vec<String> {
        let top_k = analysis.top_k;
        let min_per_product = (top_k / 2).max(1);

        let required_products: BTreeSet<String> = if analysis.target_products.is_empty() {
            fused.iter().take(40).filter_map(|(id, _)| self.product_of(id)).collect()
        } else {
            analysis.target_products.clone()
        };

        let fused_score: HashMap<&str, f64> = fused.iter().map(|(id, score)| (id.as_str(), *score)).collect();

        for _ in 0..fused.len().max(1) {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for id in &selected {
                if let Some(p) = self.product_of(id) {
                    *counts.entry(p).or_insert(0) += 1;
                }
            }

            let Some(under_product) = required_products
                .iter()
                .find(|p| counts.get(p.as_str()).copied().unwrap_or(0) < min_per_product)
                .cloned()
            else {
                break;
            };

            let replacement = fused
                .iter()
                .filter(|(id, _)| !selected.contains(id) && self.product_of(id).as_deref() == Some(under_product.as_str()))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            let Some((replacement_id, _)) = replacement else {
                break;
            };
            let replacement_id = replacement_id.clone();

            let over_product = counts
                .iter()
                .filter_map(|(product, &count)| {
                    let floor = if required_products.contains(product) { min_per_product } else { 0 };
                    (count > floor).then_some((product.clone(), count - floor))
                })
                .max_by_key(|(_, surplus)| *surplus)
                .map(|(product, _)| product);

            let Some(over_product) = over_product else {
                break;
            };

            let removal = selected
                .iter()
                .filter(|id| self.product_of(id).as_deref() == Some(over_product.as_str()))
                .min_by(|a, b| {
                    fused_score
                        .get(a.as_str())
                        .copied()
                        .unwrap_or(0.0)
                        .partial_cmp(&fused_score.get(b.as_str()).copied().unwrap_or(0.0))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned();

            let Some(removal_id) = removal else {
                break;
            };

            selected.retain(|id| *id != removal_id);
            selected.push(replacement_id);
        }

        selected.sort_by(|a, b| {
            let score_a = fused_score.get(a.as_str()).copied().unwrap_or(0.0);
            let score_b = fused_score.get(b.as_str()).copied().unwrap_or(0.0);
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.cmp(b))
        });
        selected.truncate(top_k);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::model::DocType;

    fn chunk(id: &str, product: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            product_name: product.to_string(),
            doc_type: DocType::Specifications,
            page_num: 1,
            source_file: "specifications.pdf".to_string(),
            source_url: None,
            source_name: None,
            chunk_index: 0,
            text: text.to_string(),
        }
    }

    fn build_retriever(chunks: Vec<Chunk>) -> HybridRetriever {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let embeddings: Vec<Vec<f32>> = chunks.iter().map(|c| embedder.embed(&c.text).unwrap()).collect();
        let lexical = Arc::new(LexicalIndex::build(&chunks));
        let vector = Arc::new(VectorIndex::build(&chunks, &embeddings, "hash-fallback-v1", 16).unwrap());
        let chunk_map: HashMap<String, Chunk> = chunks.into_iter().map(|c| (c.chunk_id.clone(), c)).collect();
        HybridRetriever::new(lexical, vector, embedder, Arc::new(chunk_map), 20, RrfConfig::default(), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn retrieve_returns_candidates_for_simple_query() {
        let chunks = vec![
            chunk("a_specifications_p1_c0", "Apple Watch Series 11", "battery life is eighteen hours"),
            chunk("b_specifications_p1_c0", "Garmin Forerunner 970", "gps tracking accuracy review"),
        ];
        let retriever = build_retriever(chunks);
        let analysis = QueryAnalysis {
            target_products: std::iter::once("Apple Watch Series 11".to_string()).collect(),
            is_comparison: false,
            is_complex: false,
            top_k: 5,
            diversity_enabled: false,
        };
        let results = retriever.retrieve("battery life", &analysis).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.chunk.product_name == "Apple Watch Series 11"));
    }

    #[tokio::test]
    async fn diversity_enforcement_guarantees_floor_per_product() {
        let mut chunks = Vec::new();
        for i in 0..6 {
            chunks.push(chunk(&format!("apple_{i}"), "Apple Watch Series 11", "battery life eighteen hours charge"));
        }
        chunks.push(chunk("garmin_0", "Garmin Forerunner 970", "battery life eighteen hours charge"));

        let retriever = build_retriever(chunks);
        let mut target_products = std::collections::BTreeSet::new();
        target_products.insert("Apple Watch Series 11".to_string());
        target_products.insert("Garmin Forerunner 970".to_string());
        let analysis = QueryAnalysis {
            target_products,
            is_comparison: true,
            is_complex: false,
            top_k: 4,
            diversity_enabled: true,
        };
        let results = retriever.retrieve("battery life charge", &analysis).await.unwrap();
        let garmin_count = results.iter().filter(|r| r.chunk.product_name == "Garmin Forerunner 970").count();
        assert!(garmin_count >= 1);
    }

    #[tokio::test]
    async fn both_arms_empty_is_retrieval_error() {
        let chunks = vec![chunk("a", "Apple Watch Series 11", "battery")];
        let retriever = build_retriever(chunks);
        let analysis = QueryAnalysis {
            target_products: std::iter::once("Nonexistent Product".to_string()).collect(),
            is_comparison: false,
            is_complex: false,
            top_k: 5,
            diversity_enabled: false,
        };
        let result = retriever.retrieve("zzz qqq nonexistent terms", &analysis).await;
        assert!(result.is_err());
    }
}
