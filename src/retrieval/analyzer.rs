//! Query Analyzer: classifies a raw question against the known
//! product catalog before retrieval runs.

use crate::config::ProductAliases;
use crate::model::QueryAnalysis;

const COMPARISON_KEYWORDS: &[&str] = &[
    "compare",
    "versus",
    "vs",
    "difference",
    "better",
    "between",
    "vergleich",
    "unterschied",
    "besser",
    "zwischen",
];

const COMPLEXITY_KEYWORDS: &[&str] = &[
    "how", "why", "explain", "guide", "setup", "wie", "warum", "erklären", "anleitung",
];

const COMPLEX_WORD_THRESHOLD: usize = 15;

/// Analyzes `question` against `known_products`, producing the selection
/// parameters retrieval needs. `top_k_simple`/`top_k_complex` are
/// taken from configuration rather than hardcoded.
#[must_use]
pub fn analyze(question: &str, known_products: &[ProductAliases], top_k_simple: usize, top_k_complex: usize) -> QueryAnalysis {
    let lower = question.to_lowercase();

    let target_products = known_products
        .iter()
        .filter(|product| product.match_terms().any(|term| contains_term(&lower, &term)))
        .map(|product| product.name.clone())
        .collect::<std::collections::BTreeSet<_>>();

    let is_comparison = COMPARISON_KEYWORDS.iter().any(|kw| contains_word(&lower, kw)) || target_products.len() >= 2;

    let word_count = question.split_whitespace().count();
    let is_complex = COMPLEXITY_KEYWORDS.iter().any(|kw| contains_word(&lower, kw)) || word_count > COMPLEX_WORD_THRESHOLD;

    let top_k = if is_complex { top_k_complex } else { top_k_simple };

    let diversity_enabled = is_comparison || (is_complex && target_products.len() >= 2);

    QueryAnalysis {
        target_products,
        is_comparison,
        is_complex,
        top_k,
        diversity_enabled,
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric()).any(|word| word == needle)
}

/// True if `term` occurs in `haystack` at a boundary: the character before
/// and after the match, if any, must not be alphanumeric. Plain
/// `str::contains` would let an alias like `"970"` match inside `"9700"`;
/// this keeps multi-word aliases (e.g. `"forerunner 970"`) working while
/// still requiring whole-token boundaries on both ends.
fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut start = 0usize;
    while let Some(offset) = haystack[start..].find(term) {
        let match_start = start + offset;
        let match_end = match_start + term.len();

        let before_ok = haystack[..match_start].chars().next_back().is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[match_end..].chars().next().is_none_or(|c| !c.is_alphanumeric());

        if before_ok && after_ok {
            return true;
        }
        let Some(advance) = haystack[match_start..].chars().next().map(char::len_utf8) else {
            break;
        };
        start = match_start + advance;
        if start >= haystack.len() {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn products() -> Vec<ProductAliases> {
        vec![
            ProductAliases {
                name: "Apple Watch Series 11".to_string(),
                aliases: vec!["apple watch".to_string()],
            },
            ProductAliases {
                name: "Garmin Forerunner 970".to_string(),
                aliases: vec!["forerunner 970".to_string(), "970".to_string()],
            },
        ]
    }

    #[test]
    fn detects_single_product() {
        let analysis = analyze("How long does the Apple Watch battery last?", &products(), 5, 8);
        assert_eq!(analysis.target_products.len(), 1);
        assert!(analysis.target_products.contains("Apple Watch Series 11"));
    }

    #[test]
    fn detects_comparison_from_two_products() {
        let analysis = analyze("Apple Watch vs Forerunner 970", &products(), 5, 8);
        assert!(analysis.is_comparison);
        assert_eq!(analysis.target_products.len(), 2);
    }

    #[test]
    fn detects_comparison_from_keyword_alone() {
        let analysis = analyze("What is the difference in battery life?", &products(), 5, 8);
        assert!(analysis.is_comparison);
    }

    #[test]
    fn detects_complexity_from_keyword() {
        let analysis = analyze("How do I set up GPS tracking?", &products(), 5, 8);
        assert!(analysis.is_complex);
        assert_eq!(analysis.top_k, 8);
    }

    #[test]
    fn detects_complexity_from_word_count() {
        let long_question = "tell me absolutely everything you know about the battery life screen brightness weight strap options water resistance rating and charging speed";
        let analysis = analyze(long_question, &products(), 5, 8);
        assert!(analysis.is_complex);
    }

    #[test]
    fn simple_single_product_query_disables_diversity() {
        let analysis = analyze("What is the battery life of the Apple Watch?", &products(), 5, 8);
        assert!(!analysis.diversity_enabled);
        assert_eq!(analysis.top_k, 5);
    }

    #[test]
    fn complex_multi_product_query_enables_diversity() {
        let analysis = analyze(
            "How does the Apple Watch compare to the Forerunner 970 for GPS tracking accuracy and setup?",
            &products(),
            5,
            8,
        );
        assert!(analysis.diversity_enabled);
    }

    #[test]
    fn number_alias_does_not_match_inside_another_number() {
        let analysis = analyze("What does model 9700 cost?", &products(), 5, 8);
        assert!(analysis.target_products.is_empty());
    }
}
