//! OpenAI-compatible chat-completions provider, built on `async-openai`.
//! Also serves any OpenAI-compatible endpoint (self-hosted gateways, etc.)
//! via a configurable base URL.

use crate::error::GenerationError;
use crate::generation::{GenerationResult, LlmProvider};
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_trait::async_trait;
use std::time::Instant;

/// Talks to an OpenAI-compatible chat-completions endpoint. Handles model
/// ids matching any of its configured prefixes (e.g. `"gpt-"`, `"o"`).
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model_prefixes: Vec<String>,
}

impl OpenAiProvider {
    /// Builds a provider reading `OPENAI_API_KEY` (and, if set,
    /// `OPENAI_BASE_URL`) from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error message if the API key is unset.
    pub fn from_env(model_prefixes: Vec<String>) -> std::result::Result<Self, String> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY is not set".to_string())?;
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config = config.with_api_base(base_url);
        }
        Ok(Self {
            client: Client::with_config(config),
            model_prefixes,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn handles(&self, model_id: &str) -> bool {
        self.model_prefixes.iter().any(|prefix| model_id.starts_with(prefix.as_str()))
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str, model_id: &str, temperature: f32, max_tokens: u32) -> std::result::Result<GenerationResult, GenerationError> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?
            .into();
        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(user_prompt)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?
            .into();

        let request = CreateChatCompletionRequestArgs::default()
            .model(model_id)
            .messages(vec![system_message, user_message])
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let started = Instant::now();
        let response = self.client.chat().create(request).await.map_err(|e| map_openai_error(&e))?;
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let choice = response.choices.into_iter().next().ok_or_else(|| GenerationError::Transport("empty choices array".to_string()))?;
        let text = choice.message.content.unwrap_or_default();
        let usage = response.usage.ok_or_else(|| GenerationError::Transport("missing usage in response".to_string()))?;

        Ok(GenerationResult {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            latency_ms: elapsed_ms,
        })
    }
}

fn map_openai_error(error: &async_openai::error::OpenAIError) -> GenerationError {
    match error {
        async_openai::error::OpenAIError::ApiError(api_error) => {
            let status = api_error.code.as_deref().unwrap_or("");
            if status.contains("rate_limit") || status.contains("insufficient_quota") || status.contains("invalid_api_key") {
                GenerationError::AuthOrQuota(api_error.message.clone())
            } else {
                GenerationError::ServerError {
                    attempts: 1,
                    message: api_error.message.clone(),
                }
            }
        }
        other => GenerationError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_matches_configured_prefix() {
        let provider = OpenAiProvider {
            client: Client::with_config(OpenAIConfig::new().with_api_key("test-key")),
            model_prefixes: vec!["gpt-".to_string()],
        };
        assert!(provider.handles("gpt-4o-mini"));
        assert!(!provider.handles("claude-sonnet-4-5"));
    }

    #[test]
    fn from_env_fails_without_api_key() {
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
        let result = OpenAiProvider::from_env(vec!["gpt-".to_string()]);
        assert!(result.is_err());
    }
}
