//! Page Extractor: converts PDFs under a product directory into
//! ordered [`Page`] records.
//!
//! `product_name` is derived from the enclosing folder; `doc_type` is
//! inferred from the filename (see [`DocType::from_filename`]). A companion
//! sources map is joined in by relative file path; a missing entry produces
//! a `Page` with null URL fields, which is not an error.

use crate::error::{Error, Result};
use crate::model::{DocType, Page};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// `{source_url, source_name}` entry in the sources map input artifact.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceMeta {
    /// Canonical URL for the source document, if known.
    pub source_url: Option<String>,
    /// Human-readable source document name, if known.
    pub source_name: Option<String>,
}

/// `{ product_name: { relative_file_path: {source_url, source_name} } }`,
/// the on-disk input artifact.
pub type SourcesMap = HashMap<String, HashMap<String, SourceMeta>>;

/// Loads a sources map JSON file. A missing file is treated as an empty map
/// (every page simply gets null URL fields), not an error.
pub fn load_sources_map(path: &Path) -> Result<SourcesMap> {
    if !path.exists() {
        return Ok(SourcesMap::new());
    }
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Extraction(format!("parsing sources map {}: {e}", path.display())))
}

/// Extracts raw per-page text from a single PDF file.
///
/// This is the black-box text extractor: it owns
/// no knowledge of products, chunking, or tokenization, only page
/// boundaries and raw text content.
///
/// # Errors
///
/// Returns [`Error::Extraction`] if the PDF cannot be opened or parsed.
#[cfg(feature = "pdf-extraction")]
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(path)
        .map_err(|e| Error::Extraction(format!("extracting {}: {e}", path.display())))
}

/// Extracts raw per-page text from a single PDF file (feature not enabled).
#[cfg(not(feature = "pdf-extraction"))]
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    Err(Error::Extraction(format!(
        "PDF extraction is disabled in this build (missing 'pdf-extraction' feature); cannot read {}",
        path.display()
    )))
}

/// Walks `product_dir`, extracting one [`Page`] per physical page of every
/// PDF directly inside it. `product_name` is the directory's own file
/// name. One failed PDF is recorded and skipped rather than aborting the
/// whole directory; its path is returned alongside the
/// successfully extracted pages so the caller can report a non-zero exit
/// summary.
///
/// # Errors
///
/// Returns [`Error::Extraction`] only if `product_dir` itself cannot be read.
pub fn extract_product(product_dir: &Path, sources: &SourcesMap) -> Result<(Vec<Page>, Vec<(PathBuf, String)>)> {
    let product_name = product_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Extraction(format!("invalid product directory {}", product_dir.display())))?
        .to_string();

    let product_sources = sources.get(&product_name);

    let mut pages = Vec::new();
    let mut failures = Vec::new();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(product_dir)
        .map_err(|e| Error::Extraction(format!("reading {}: {e}", product_dir.display())))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("pdf")))
        .collect();
    entries.sort();

    for file_path in entries {
        let source_file = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let doc_type = DocType::from_filename(&source_file);
        let meta = product_sources.and_then(|m| m.get(&source_file));

        match extract_pdf_pages(&file_path) {
            Ok(raw_pages) => {
                for (idx, raw_text) in raw_pages.into_iter().enumerate() {
                    #[allow(clippy::cast_possible_truncation)]
                    let page_num = (idx + 1) as u32;
                    pages.push(Page {
                        product_name: product_name.clone(),
                        doc_type,
                        page_num,
                        source_file: source_file.clone(),
                        source_url: meta.and_then(|m| m.source_url.clone()),
                        source_name: meta.and_then(|m| m.source_name.clone()),
                        text: normalize_text(&raw_text),
                    });
                }
            }
            Err(e) => {
                failures.push((file_path, e.to_string()));
            }
        }
    }

    Ok((pages, failures))
}

/// NFC-normalizes text and collapses nothing else: whitespace structure is
/// preserved as extracted.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_is_nfc() {
        // "é" as combining sequence (e + combining acute) normalizes to
        // the single precomposed code point.
        let decomposed = "e\u{0301}table";
        let normalized = normalize_text(decomposed);
        assert_eq!(normalized, "\u{00e9}table");
    }

    #[test]
    fn missing_sources_map_is_empty_not_error() {
        let map = load_sources_map(Path::new("/nonexistent/sources.json")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn extract_product_rejects_unreadable_directory() {
        let result = extract_product(Path::new("/nonexistent/product"), &SourcesMap::new());
        assert!(result.is_err());
    }
}
