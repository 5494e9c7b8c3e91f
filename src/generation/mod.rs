//! Generation Dispatcher: a provider-agnostic interface over the
//! configured language-model backends, with timeout and retry policy
//! applied uniformly regardless of which provider answers.

pub mod anthropic;
pub mod citation;
#[cfg(feature = "openai-provider")]
pub mod openai;
pub mod prompt;

use crate::config::{AppConfig, ModelPricing};
use crate::error::{Error, GenerationError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One completed generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// The generated answer text.
    pub text: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: u32,
    /// Completion tokens produced.
    pub completion_tokens: u32,
    /// Wall-clock latency of the call, in milliseconds.
    pub latency_ms: u64,
}

/// Provider-agnostic interface to a language-model backend.
/// Implementations talk to exactly one provider family; `model_id` selects
/// the specific model within that family.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider family name, used for diagnostics (e.g. `"anthropic"`).
    fn name(&self) -> &str;

    /// True iff this provider can serve `model_id`.
    fn handles(&self, model_id: &str) -> bool;

    /// Issues one generation call. Implementations must not retry
    /// internally; the dispatcher owns retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] on any provider failure.
    async fn generate(&self, system_prompt: &str, user_prompt: &str, model_id: &str, temperature: f32, max_tokens: u32) -> std::result::Result<GenerationResult, GenerationError>;
}

const MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Dispatches generation calls to the configured provider for a given
/// `model_id`, applying a per-call timeout and retrying transient 5xx
/// failures with exponential backoff.
pub struct GenerationDispatcher {
    providers: Vec<Arc<dyn LlmProvider>>,
    pricing: HashMap<String, ModelPricing>,
    call_timeout: Duration,
}

impl GenerationDispatcher {
    /// Builds a dispatcher over `providers`, tried in order for a given
    /// `model_id`, with pricing looked up from `config.provider_pricing`.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>, config: &AppConfig, call_timeout: Duration) -> Self {
        Self {
            providers,
            pricing: config.provider_pricing.clone(),
            call_timeout,
        }
    }

    /// Generates an answer for `model_id`, returning text, token usage, and
    /// `cost_usd` computed from the configured per-Mtok pricing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] wrapping [`GenerationError::UnknownModel`]
    /// if no provider or pricing entry matches `model_id`, `Timeout` if the
    /// call does not complete within the timeout, `AuthOrQuota` (never
    /// retried), or `ServerError` after retries are exhausted.
    pub async fn generate(&self, system_prompt: &str, user_prompt: &str, model_id: &str, temperature: f32, max_tokens: u32) -> Result<(GenerationResult, f64)> {
        let pricing = self
            .pricing
            .get(model_id)
            .copied()
            .ok_or_else(|| Error::Generation(GenerationError::UnknownModel(model_id.to_string())))?;

        let provider = self
            .providers
            .iter()
            .find(|p| p.handles(model_id))
            .ok_or_else(|| Error::Generation(GenerationError::UnknownModel(model_id.to_string())))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.call_timeout, provider.generate(system_prompt, user_prompt, model_id, temperature, max_tokens)).await;

            match outcome {
                Err(_) => {
                    return Err(Error::Generation(GenerationError::Timeout {
                        #[allow(clippy::cast_possible_truncation)]
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }));
                }
                Ok(Ok(result)) => {
                    let cost = pricing.cost_usd(result.prompt_tokens, result.completion_tokens);
                    return Ok((result, cost));
                }
                Ok(Err(GenerationError::ServerError { message, .. })) if attempt <= MAX_RETRIES => {
                    tracing::warn!(attempt, %message, "provider server error, retrying");
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                }
                Ok(Err(GenerationError::ServerError { attempts: _, message })) => {
                    return Err(Error::Generation(GenerationError::ServerError { attempts: attempt, message }));
                }
                Ok(Err(other)) => return Err(Error::Generation(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn handles(&self, model_id: &str) -> bool {
            model_id == "flaky-model"
        }

        async fn generate(&self, _system_prompt: &str, _user_prompt: &str, _model_id: &str, _temperature: f32, _max_tokens: u32) -> std::result::Result<GenerationResult, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(GenerationError::ServerError {
                    attempts: call + 1,
                    message: "temporary overload".to_string(),
                })
            } else {
                Ok(GenerationResult {
                    text: "answer [1]".to_string(),
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    latency_ms: 10,
                })
            }
        }
    }

    fn config_with_pricing() -> AppConfig {
        let mut config = AppConfig::default();
        config.provider_pricing.insert(
            "flaky-model".to_string(),
            ModelPricing {
                input_per_mtok: 3.0,
                output_per_mtok: 15.0,
            },
        );
        config
    }

    #[tokio::test]
    async fn retries_server_error_and_succeeds() {
        let provider = Arc::new(FlakyProvider {
            failures_before_success: 1,
            calls: AtomicU32::new(0),
        });
        let dispatcher = GenerationDispatcher::new(vec![provider], &config_with_pricing(), Duration::from_secs(5));
        let (result, cost) = dispatcher.generate("system", "user", "flaky-model", 0.3, 800).await.unwrap();
        assert_eq!(result.text, "answer [1]");
        assert!(cost > 0.0);
    }

    #[tokio::test]
    async fn exhausts_retries_and_fails() {
        let provider = Arc::new(FlakyProvider {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
        });
        let dispatcher = GenerationDispatcher::new(vec![provider], &config_with_pricing(), Duration::from_secs(5));
        let result = dispatcher.generate("system", "user", "flaky-model", 0.3, 800).await;
        assert!(matches!(result, Err(Error::Generation(GenerationError::ServerError { .. }))));
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_any_provider_call() {
        let dispatcher = GenerationDispatcher::new(vec![], &config_with_pricing(), Duration::from_secs(5));
        let result = dispatcher.generate("system", "user", "nonexistent-model", 0.3, 800).await;
        assert!(matches!(result, Err(Error::Generation(GenerationError::UnknownModel(_)))));
    }
}
