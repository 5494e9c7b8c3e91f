//! Shared whitespace tokenizer.
//!
//! The chunker (sizing) and the lexical index (build + query)
//! must agree on what a "token" is. This is the one place that
//! symmetry can be violated, so both call through here instead of each
//! rolling their own splitting.

/// Splits `text` into whitespace-delimited tokens, lowercased.
///
/// This is the tokenizer the BM25 index uses at both build and query time,
/// and the estimator the chunker uses to size chunks. Keeping it to a
/// single function is what makes tokenizer symmetry structurally true
/// rather than something that has to be tested for.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Counts tokens in `text` without allocating the token vector.
#[must_use]
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}
