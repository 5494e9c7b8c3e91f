//! Anthropic Messages API provider.

use crate::error::GenerationError;
use crate::generation::{GenerationResult, LlmProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorEnvelope {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Talks to the Anthropic Messages API. Handles exactly the `claude-*`
/// family of model ids configured for this provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_prefixes: Vec<String>,
}

impl AnthropicProvider {
    /// Builds a provider for the given model id prefixes (e.g. `"claude-"`),
    /// reading the API key from `ANTHROPIC_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error message if the environment variable is unset.
    pub fn from_env(model_prefixes: Vec<String>) -> std::result::Result<Self, String> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| "ANTHROPIC_API_KEY is not set".to_string())?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_prefixes,
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn handles(&self, model_id: &str) -> bool {
        self.model_prefixes.iter().any(|prefix| model_id.starts_with(prefix.as_str()))
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str, model_id: &str, temperature: f32, max_tokens: u32) -> std::result::Result<GenerationResult, GenerationError> {
        let request = AnthropicRequest {
            model: model_id.to_string(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: user_prompt.to_string(),
            }],
            max_tokens,
            system: Some(system_prompt.to_string()),
            temperature,
        };

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::AuthOrQuota(body));
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::ServerError { attempts: 1, message: body });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicErrorEnvelope>(&body).map_or(body, |e| format!("{}: {}", e.error.error_type, e.error.message));
            return Err(GenerationError::Transport(message));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| GenerationError::Transport(e.to_string()))?;

        let text = parsed.content.into_iter().map(|block| block.text).collect::<Vec<_>>().join("");

        Ok(GenerationResult {
            text,
            prompt_tokens: parsed.usage.input_tokens,
            completion_tokens: parsed.usage.output_tokens,
            latency_ms: elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_matches_configured_prefix() {
        let provider = AnthropicProvider {
            client: reqwest::Client::new(),
            api_key: "test-key".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_prefixes: vec!["claude-".to_string()],
        };
        assert!(provider.handles("claude-sonnet-4-5"));
        assert!(!provider.handles("gpt-4o"));
    }

    #[test]
    fn from_env_fails_without_api_key() {
        unsafe {
            std::env::remove_var("ANTHROPIC_API_KEY");
        }
        let result = AnthropicProvider::from_env(vec!["claude-".to_string()]);
        assert!(result.is_err());
    }
}
