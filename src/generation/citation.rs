//! Citation Extractor: parses `[n]` markers out of a generated
//! answer and projects the referenced chunks into [`Source`] records.

use crate::model::{RetrievalResult, Source};
use regex::Regex;
use std::sync::OnceLock;

#[allow(clippy::expect_used)] // literal pattern is compile-time constant, cannot fail to parse
fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid regex"))
}

/// Extracts the cited context positions from `answer` and returns the
/// corresponding [`Source`] records, preserving each chunk's original
/// context index as `citation_number`. Falls back to returning every
/// retrieved chunk as a source when the answer cites none.
#[must_use]
pub fn extract(answer: &str, retrieved: &[RetrievalResult]) -> Vec<Source> {
    let raw_matches: Vec<usize> = citation_pattern().captures_iter(answer).filter_map(|capture| capture.get(1)?.as_str().parse::<usize>().ok()).collect();

    if raw_matches.is_empty() {
        return retrieved.iter().enumerate().map(|(idx, result)| to_source(idx + 1, result)).collect();
    }

    let mut numbers: Vec<usize> = raw_matches.into_iter().filter(|n| *n >= 1 && *n <= retrieved.len()).collect();
    numbers.sort_unstable();
    numbers.dedup();

    numbers.into_iter().map(|n| to_source(n, &retrieved[n - 1])).collect()
}

fn to_source(citation_number: usize, result: &RetrievalResult) -> Source {
    Source {
        citation_number,
        product_name: result.chunk.product_name.clone(),
        doc_type: result.chunk.doc_type,
        page_num: result.chunk.page_num,
        source_file: result.chunk.source_file.clone(),
        source_url: result.chunk.source_url.clone(),
        source_name: result.chunk.source_name.clone(),
    }
}
