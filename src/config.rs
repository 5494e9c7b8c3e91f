//! Application configuration.
//!
//! Loads settings from an optional TOML file,
//! layered under environment-variable overrides, into a single validated
//! [`AppConfig`]. Unknown keys in the file are a load-time error.

use crate::error::{Error, Result};
use crate::model::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-million-token pricing for one model id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per 1,000,000 prompt tokens.
    pub input_per_mtok: f64,
    /// USD per 1,000,000 completion tokens.
    pub output_per_mtok: f64,
}

impl ModelPricing {
    /// Computes the cost in USD for the given token counts.
    #[must_use]
    pub fn cost_usd(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        f64::from(prompt_tokens) * self.input_per_mtok / 1_000_000.0
            + f64::from(completion_tokens) * self.output_per_mtok / 1_000_000.0
    }
}

/// A known product and the aliases the query analyzer matches against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAliases {
    /// Canonical product name, used as `Chunk::product_name`.
    pub name: String,
    /// Case-insensitive aliases (full name, short name, model number) that
    /// identify this product in a question. `name` itself is always matched
    /// even if not repeated here.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ProductAliases {
    /// All strings this product is recognized by, lowercased for matching.
    pub fn match_terms(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.name.to_lowercase())
            .chain(self.aliases.iter().map(|a| a.to_lowercase()))
    }
}

/// Validated, fully-resolved application configuration.
///
/// Construct via [`AppConfig::load`]; do not build a default instance for
/// production use since `known_products` and `provider_pricing` must be
/// supplied by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    /// Target chunk size in tokens.
    pub chunk_target_tokens: usize,
    /// Overlap between consecutive chunks, in tokens.
    pub chunk_overlap_tokens: usize,
    /// Identity of the sentence encoder; must match at index build and query time.
    pub embedder_name: String,
    /// Embedding dimension.
    pub vector_dim: usize,
    /// Per-arm candidate count before fusion.
    pub retrieve_k: usize,
    /// RRF smoothing constant. Standard value is 60; exposed here only so
    /// tests can exercise other values.
    pub rrf_k: u32,
    /// top_k for non-complex queries.
    pub default_top_k_simple: usize,
    /// top_k for complex queries.
    pub default_top_k_complex: usize,
    /// End-to-end request deadline, milliseconds.
    pub request_deadline_ms: u64,
    /// Retrieval soft deadline, milliseconds.
    pub retrieval_deadline_ms: u64,
    /// Generation sampling temperature.
    pub temperature: f32,
    /// Maximum output tokens requested from the provider.
    pub max_output_tokens: u32,
    /// Map of model_id to pricing.
    pub provider_pricing: HashMap<String, ModelPricing>,
    /// Worker pool bound (max in-flight requests).
    pub max_concurrent_requests: usize,
    /// Directory containing the chunks file, lexical index, and vector index directory.
    pub data_dir: PathBuf,
    /// Products the query analyzer recognizes.
    pub known_products: Vec<ProductAliases>,
    /// Address the HTTP layer binds.
    pub http_bind_addr: String,
    /// Path to the embedded conversation database file.
    pub conversation_db_path: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive string.
    pub log_filter: String,
    /// Default answer language when a request omits `language`.
    pub default_language: Language,
    /// Default model id when a request omits `model`.
    pub default_model_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_target_tokens: 800,
            chunk_overlap_tokens: 200,
            embedder_name: "paraphrase-multilingual-MiniLM-L12-v2".to_string(),
            vector_dim: 384,
            retrieve_k: 20,
            rrf_k: 60,
            default_top_k_simple: 5,
            default_top_k_complex: 8,
            request_deadline_ms: 60_000,
            retrieval_deadline_ms: 2_000,
            temperature: 0.3,
            max_output_tokens: 800,
            provider_pricing: HashMap::new(),
            max_concurrent_requests: 64,
            data_dir: PathBuf::from("./data"),
            known_products: Vec::new(),
            http_bind_addr: "0.0.0.0:8080".to_string(),
            conversation_db_path: PathBuf::from("./data/conversations.db"),
            log_filter: "verifyr=info,tower_http=info".to_string(),
            default_language: Language::En,
            default_model_id: String::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path` (if present), then applies
    /// `VERIFYR_*` environment variable overrides, then validates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file contains an unknown key, is not
    /// valid TOML, or validation fails (e.g. `rrf_k` of zero, an empty
    /// `known_products` list, or an overlap ≥ target chunk size).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("reading {}: {e}", p.display())))?;
                toml::from_str::<Self>(&text)
                    .map_err(|e| Error::Config(format!("parsing {}: {e}", p.display())))?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VERIFYR_HTTP_BIND_ADDR") {
            self.http_bind_addr = v;
        }
        if let Ok(v) = std::env::var("VERIFYR_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VERIFYR_CONVERSATION_DB_PATH") {
            self.conversation_db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VERIFYR_LOG_FILTER") {
            self.log_filter = v;
        }
        if let Ok(v) = std::env::var("VERIFYR_MAX_CONCURRENT_REQUESTS") {
            if let Ok(n) = v.parse() {
                self.max_concurrent_requests = n;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_overlap_tokens >= self.chunk_target_tokens {
            return Err(Error::Config(format!(
                "chunk_overlap_tokens ({}) must be less than chunk_target_tokens ({})",
                self.chunk_overlap_tokens, self.chunk_target_tokens
            )));
        }
        if self.rrf_k == 0 {
            return Err(Error::Config("rrf_k must be > 0".to_string()));
        }
        if self.vector_dim == 0 {
            return Err(Error::Config("vector_dim must be > 0".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::Config(
                "max_concurrent_requests must be > 0".to_string(),
            ));
        }
        if self.default_top_k_simple == 0 || self.default_top_k_complex == 0 {
            return Err(Error::Config(
                "default_top_k_simple and default_top_k_complex must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Path to the chunks JSON artifact under `data_dir`.
    #[must_use]
    pub fn chunks_path(&self) -> PathBuf {
        self.data_dir.join("chunks.json")
    }

    /// Path to the lexical (BM25) index artifact under `data_dir`.
    #[must_use]
    pub fn lexical_index_path(&self) -> PathBuf {
        self.data_dir.join("lexical_index.json")
    }

    /// Path to the vector index directory under `data_dir`.
    #[must_use]
    pub fn vector_index_dir(&self) -> PathBuf {
        self.data_dir.join("vector_index")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let mut cfg = AppConfig::default();
        cfg.known_products.push(ProductAliases {
            name: "Apple Watch Series 11".to_string(),
            aliases: vec!["apple watch".to_string()],
        });
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_overlap_larger_than_target() {
        let mut cfg = AppConfig {
            chunk_target_tokens: 100,
            chunk_overlap_tokens: 100,
            ..AppConfig::default()
        };
        cfg.apply_env_overrides();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        let toml_text = "chunk_target_tokens = 800\nbogus_option = 5\n";
        let result: std::result::Result<AppConfig, _> = toml::from_str(toml_text);
        assert!(result.is_err());
    }

    #[test]
    fn pricing_cost_formula() {
        let pricing = ModelPricing {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        };
        let cost = pricing.cost_usd(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn match_terms_includes_canonical_name() {
        let product = ProductAliases {
            name: "Garmin Forerunner 970".to_string(),
            aliases: vec!["forerunner 970".to_string(), "970".to_string()],
        };
        let terms: Vec<String> = product.match_terms().collect();
        assert!(terms.contains(&"garmin forerunner 970".to_string()));
        assert!(terms.contains(&"970".to_string()));
    }
}
