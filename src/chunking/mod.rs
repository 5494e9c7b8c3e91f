//! Chunker: splits a [`Page`](crate::model::Page) into overlapping,
//! token-bounded [`Chunk`](crate::model::Chunk)s.
//!
//! Split points are chosen by recursive separator preference (paragraph
//! breaks, then newlines, then sentence boundaries, then words, then bare
//! characters); a chunk is emitted once the next split would exceed the
//! target size, and the next chunk starts by rewinding the configured
//! overlap from the end of the previous one. The same [`tokenize`] function
//! the lexical index uses is the estimator this module sizes chunks with
//! so both halves of the tokenizer-symmetry requirement live behind one import.

use crate::model::{Chunk, Page};
use crate::tokenize::token_count;

/// Separators tried in priority order when looking for a split point.
/// Paragraph breaks first, then single newlines, then sentence ends, then
/// bare spaces; an empty string as the final entry means "split anywhere",
/// i.e. fall through to a bare character boundary.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Splits every non-empty [`Page`] in `pages` into [`Chunk`]s using
/// `target_tokens`/`overlap_tokens`, in page order.
///
/// Empty pages (after normalization) are skipped: "empty pages
/// produce zero chunks" contract.
#[must_use]
pub fn chunk_pages(pages: &[Page], target_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    pages
        .iter()
        .flat_map(|page| chunk_page(page, target_tokens, overlap_tokens))
        .collect()
}

/// Splits a single [`Page`]'s text into a deterministic sequence of [`Chunk`]s.
#[must_use]
pub fn chunk_page(page: &Page, target_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let pieces = split_text(&page.text, target_tokens, overlap_tokens);
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            #[allow(clippy::cast_possible_truncation)]
            let chunk_index = index as u32;
            Chunk {
                chunk_id: Chunk::make_id(page, chunk_index),
                product_name: page.product_name.clone(),
                doc_type: page.doc_type,
                page_num: page.page_num,
                source_file: page.source_file.clone(),
                source_url: page.source_url.clone(),
                source_name: page.source_name.clone(),
                chunk_index,
                text,
            }
        })
        .collect()
}

/// Splits `text` into a sequence of overlapping slices, each at most
/// `target_tokens` long (recursive-separator preference).
fn split_text(text: &str, target_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if token_count(text) <= target_tokens {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut cursor = 0usize;

    while cursor < text.len() {
        let remaining = &text[cursor..];
        if token_count(remaining) <= target_tokens {
            pieces.push(remaining.to_string());
            break;
        }

        let split_at = find_split_point(remaining, target_tokens);
        let piece = &remaining[..split_at];
        pieces.push(piece.to_string());

        let next_start = cursor + rewind_for_overlap(piece, overlap_tokens);
        if next_start <= cursor {
            // Guard against a degenerate separator search making no
            // progress; force forward movement past this piece.
            cursor += split_at.max(1);
        } else {
            cursor = next_start;
        }
    }

    pieces
}

/// Finds the byte offset within `text` at which to cut so the left side is
/// at most `target_tokens` tokens, preferring the highest-priority
/// separator available inside the search window.
fn find_split_point(text: &str, target_tokens: usize) -> usize {
    let approx_bytes = approx_byte_offset_for_tokens(text, target_tokens);
    let window_start = approx_bytes.saturating_sub(approx_bytes / 4).max(1);
    let window_end = approx_bytes.min(text.len());
    if window_start >= window_end {
        return char_boundary_at_or_before(text, approx_bytes.max(1));
    }

    let window = &text[char_boundary_at_or_before(text, window_start)..char_boundary_at_or_before(text, window_end)];
    let window_base = char_boundary_at_or_before(text, window_start);

    for sep in SEPARATORS {
        if sep.is_empty() {
            continue;
        }
        if let Some(pos) = window.rfind(sep) {
            let cut = window_base + pos + sep.len();
            if cut > 0 && cut <= text.len() {
                return char_boundary_at_or_before(text, cut);
            }
        }
    }

    // No separator found in the window: fall back to a bare character
    // boundary at the approximate offset (last-resort SEPARATORS entry).
    char_boundary_at_or_before(text, approx_bytes.max(1))
}

/// Approximates the byte offset corresponding to `target_tokens` tokens by
/// walking whitespace-delimited words; used only to bound the search window
/// for [`find_split_point`], never to decide the cut itself.
fn approx_byte_offset_for_tokens(text: &str, target_tokens: usize) -> usize {
    let mut seen = 0usize;
    let mut offset = 0usize;
    for word in text.split_inclusive(char::is_whitespace) {
        if seen >= target_tokens {
            break;
        }
        offset += word.len();
        if !word.trim().is_empty() {
            seen += 1;
        }
    }
    offset.min(text.len())
}

/// Rewinds from the end of `piece` by `overlap_tokens` tokens, returning the
/// byte length of `piece` minus that rewind, so the next chunk starts with
/// the configured overlap.
fn rewind_for_overlap(piece: &str, overlap_tokens: usize) -> usize {
    if overlap_tokens == 0 {
        return piece.len();
    }
    let rewind_bytes = piece.len() - approx_byte_offset_for_tokens_from_end(piece, overlap_tokens);
    piece.len().saturating_sub(rewind_bytes)
}

/// Like [`approx_byte_offset_for_tokens`] but counted from the end of `text`.
fn approx_byte_offset_for_tokens_from_end(text: &str, target_tokens: usize) -> usize {
    let words: Vec<&str> = text.split_inclusive(char::is_whitespace).collect();
    let mut seen = 0usize;
    let mut offset = text.len();
    for word in words.into_iter().rev() {
        if seen >= target_tokens {
            break;
        }
        offset -= word.len();
        if !word.trim().is_empty() {
            seen += 1;
        }
    }
    offset
}

fn char_boundary_at_or_before(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocType;

    fn page_with_text(text: &str) -> Page {
        Page {
            product_name: "Apple Watch Series 11".to_string(),
            doc_type: DocType::Specifications,
            page_num: 9,
            source_file: "specifications.pdf".to_string(),
            source_url: None,
            source_name: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn empty_page_yields_zero_chunks() {
        let page = page_with_text("   \n  ");
        assert!(chunk_page(&page, 800, 200).is_empty());
    }

    #[test]
    fn short_page_yields_single_chunk() {
        let page = page_with_text("18 hours battery life on a single charge.");
        let chunks = chunk_page(&page, 800, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "Apple Watch Series 11_specifications_p9_c0");
        assert_eq!(chunks[0].text, "18 hours battery life on a single charge.");
    }

    #[test]
    fn long_page_splits_into_multiple_chunks_with_overlap() {
        let paragraph = "word ".repeat(50);
        let text = std::iter::repeat(paragraph.trim())
            .take(40)
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_page(&page_with_text(&text), 100, 20);
        assert!(chunks.len() > 1, "expected multiple chunks, got {}", chunks.len());
        for chunk in &chunks {
            assert!(token_count(&chunk.text) <= 100 + 20, "chunk exceeded target+tolerance");
        }
        for (i, chunk) in chunks.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let expected_index = i as u32;
            assert_eq!(chunk.chunk_index, expected_index);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let paragraph = "one two three four five six seven eight nine ten. ".repeat(30);
        let page = page_with_text(&paragraph);
        let first = chunk_page(&page, 50, 10);
        let second = chunk_page(&page, 50, 10);
        assert_eq!(first, second);
    }

    #[test]
    fn chunk_id_is_globally_unique_within_a_page() {
        let paragraph = "lorem ipsum dolor sit amet consectetur adipiscing elit ".repeat(30);
        let chunks = chunk_page(&page_with_text(&paragraph), 30, 5);
        let ids: std::collections::HashSet<_> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        assert_eq!(ids.len(), chunks.len());
    }
}
