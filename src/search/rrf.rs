//! Reciprocal Rank Fusion (C7's fusion step).
//!
//! Combines the lexical and vector ranked lists into one fused ranking.
//! Based on: Cormack, Clarke, Buettcher (2009) - "Reciprocal Rank Fusion
//! outperforms Condorcet and individual Rank Learning Methods". Operates on
//! chunk-id strings rather than integer row ids, since chunk ids are the
//! join key between the lexical and vector arms.

use std::collections::HashMap;

/// RRF tuning knob. Higher `k` flattens the gap between early and late ranks.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    /// Recommended default in the originating paper, and the value the
    /// query pipeline uses unconditionally.
    pub k: u32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60 }
    }
}

impl RrfConfig {
    /// Creates an RRF config with the given `k`.
    #[must_use]
    pub const fn new(k: u32) -> Self {
        Self { k }
    }
}

/// Fuses multiple ranked chunk-id lists (most relevant first) into one
/// ranking via `score(c) = Σ 1 / (k + rank(c) + 1)`, summed over the lists
/// that contain `c`. Returns `(chunk_id, fused_score)` sorted descending by
/// score, ties broken by `chunk_id` ascending for determinism.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn reciprocal_rank_fusion(ranked_lists: &[&[String]], config: &RrfConfig) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();

    for list in ranked_lists {
        for (rank, chunk_id) in list.iter().enumerate() {
            let rrf_score = 1.0 / f64::from(config.k + (rank as u32) + 1);
            *scores.entry(chunk_id.as_str()).or_insert(0.0) += rrf_score;
        }
    }

    let mut results: Vec<(String, f64)> = scores.into_iter().map(|(id, score)| (id.to_string(), score)).collect();
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn single_list_preserves_rank_order() {
        let list = ids(&["a", "b", "c"]);
        let config = RrfConfig::new(60);
        let results = reciprocal_rank_fusion(&[&list], &config);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 > results[1].1);
        assert!(results[1].1 > results[2].1);
    }

    #[test]
    fn disjoint_lists_tie_at_matching_rank() {
        let list1 = ids(&["a", "b"]);
        let list2 = ids(&["c", "d"]);
        let config = RrfConfig::new(60);
        let results = reciprocal_rank_fusion(&[&list1, &list2], &config);
        assert_eq!(results.len(), 4);
        let score_a = results.iter().find(|(id, _)| id == "a").unwrap().1;
        let score_c = results.iter().find(|(id, _)| id == "c").unwrap().1;
        assert!((score_a - score_c).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_lists_yield_no_results() {
        let list: Vec<String> = vec![];
        let config = RrfConfig::new(60);
        assert!(reciprocal_rank_fusion(&[&list], &config).is_empty());
    }

    #[test]
    fn score_formula_matches_1_over_k_plus_rank_plus_1() {
        let list = ids(&["a"]);
        let config = RrfConfig::new(60);
        let results = reciprocal_rank_fusion(&[&list], &config);
        let expected = 1.0 / 61.0;
        assert!((results[0].1 - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn item_in_both_lists_sums_scores() {
        let list1 = ids(&["a"]);
        let list2 = ids(&["a"]);
        let config = RrfConfig::new(60);
        let results = reciprocal_rank_fusion(&[&list1, &list2], &config);
        let expected = 2.0 / 61.0;
        assert!((results[0].1 - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn ties_break_by_chunk_id_ascending() {
        let list1 = ids(&["z"]);
        let list2 = ids(&["a"]);
        let config = RrfConfig::new(60);
        let results = reciprocal_rank_fusion(&[&list1, &list2], &config);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "z");
    }
}
