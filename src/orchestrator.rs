//! Query Orchestrator: wires the query analyzer, hybrid retriever,
//! prompt composer, generation dispatcher, and conversation store into one
//! request contract.
//!
//! A turn is all-or-nothing: the user and assistant messages are only
//! appended to the conversation store once generation and citation
//! extraction have both succeeded. A failure at any earlier stage leaves no
//! trace in the conversation.

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::generation::citation;
use crate::generation::prompt;
use crate::generation::GenerationDispatcher;
use crate::model::{Language, Message, RequestIdentity, Role, Source, TokenUsage};
use crate::retrieval::analyzer;
use crate::retrieval::HybridRetriever;
use crate::storage::ConversationStore;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const MAX_QUESTION_CHARS: usize = 2000;

/// One incoming question, with the identity that asked it and the optional
/// conversation it continues.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The raw question text.
    pub question: String,
    /// Conversation to append this turn to; a new conversation is created
    /// when absent.
    pub conversation_id: Option<Uuid>,
    /// Model id override; falls back to the conversation's own model, then
    /// [`AppConfig::default_model_id`].
    pub model: Option<String>,
    /// Answer language override; falls back to the conversation's own
    /// language, then [`AppConfig::default_language`].
    pub language: Option<Language>,
    /// The verified identity making this request.
    pub requester: RequestIdentity,
}

/// The answer to one [`QueryRequest`], ready for the HTTP layer to serialize.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// The generated answer text, including its `[n]` citation markers.
    pub answer: String,
    /// Sources cited by the answer.
    pub sources: Vec<Source>,
    /// The conversation this turn was appended to.
    pub conversation_id: Uuid,
    /// Wall-clock duration of the whole request, in milliseconds.
    pub response_time_ms: u64,
    /// The model id actually used for generation.
    pub model_used: String,
    /// Token usage for this turn's generation call.
    pub tokens_used: TokenUsage,
    /// Estimated cost in USD for this turn's generation call.
    pub cost_usd: f64,
}

/// Ties the per-request collaborators together behind one entry point.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    retriever: Arc<HybridRetriever>,
    dispatcher: Arc<GenerationDispatcher>,
    store: Arc<ConversationStore>,
}

impl Orchestrator {
    /// Builds an orchestrator over already-constructed collaborators.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, retriever: Arc<HybridRetriever>, dispatcher: Arc<GenerationDispatcher>, store: Arc<ConversationStore>) -> Self {
        Self { config, retriever, dispatcher, store }
    }

    /// Runs one query end to end, enforcing the request's overall deadline
    /// (`request_deadline_ms`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the deadline elapses, or any error
    /// surfaced by the analyzer, retriever, dispatcher, or store stages.
    pub async fn handle_query(&self, request: QueryRequest) -> Result<QueryResponse> {
        let deadline = std::time::Duration::from_millis(self.config.request_deadline_ms);
        match tokio::time::timeout(deadline, self.handle_query_inner(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn handle_query_inner(&self, request: QueryRequest) -> Result<QueryResponse> {
        let started = Instant::now();

        let question = request.question.trim();
        if question.is_empty() || question.chars().count() > MAX_QUESTION_CHARS {
            return Err(Error::Validation(format!("question must be 1..={MAX_QUESTION_CHARS} characters")));
        }

        let (conversation_id, language, model_id) = self.resolve_conversation(&request).await?;

        let analysis = analyzer::analyze(question, &self.config.known_products, self.config.default_top_k_simple, self.config.default_top_k_complex);

        tracing::info!(conversation_id = %conversation_id, is_comparison = analysis.is_comparison, is_complex = analysis.is_complex, "analyzed question");

        let retrieved = self.retriever.retrieve(question, &analysis).await?;

        let prompts = prompt::compose(question, &retrieved, language, analysis.target_products.len().max(1));

        let (generation, cost_usd) = self
            .dispatcher
            .generate(&prompts.system_prompt, &prompts.user_prompt, &model_id, self.config.temperature, self.config.max_output_tokens)
            .await?;

        let sources = citation::extract(&generation.text, &retrieved);
        let tokens_used = TokenUsage { input: generation.prompt_tokens, output: generation.completion_tokens };

        let now = chrono::Utc::now();
        self.store
            .append_turn(
                conversation_id,
                Message {
                    role: Role::User,
                    content: question.to_string(),
                    created_at: now,
                    sources: None,
                    model: None,
                    tokens: None,
                    cost: None,
                },
                Message {
                    role: Role::Assistant,
                    content: generation.text.clone(),
                    created_at: chrono::Utc::now(),
                    sources: Some(sources.clone()),
                    model: Some(model_id.clone()),
                    tokens: Some(tokens_used),
                    cost: Some(cost_usd),
                },
            )
            .await?;

        #[allow(clippy::cast_possible_truncation)]
        let response_time_ms = started.elapsed().as_millis() as u64;

        Ok(QueryResponse {
            answer: generation.text,
            sources,
            conversation_id,
            response_time_ms,
            model_used: model_id,
            tokens_used,
            cost_usd,
        })
    }

    /// Resolves the conversation this turn belongs to, along with the
    /// effective language and model id: a request-supplied override wins,
    /// otherwise a pre-existing conversation's own values are reused,
    /// otherwise the configured defaults apply.
    async fn resolve_conversation(&self, request: &QueryRequest) -> Result<(Uuid, Language, String)> {
        if let Some(conversation_id) = request.conversation_id {
            let existing = self.store.get(conversation_id, &request.requester).await?;
            let language = request.language.unwrap_or(existing.language);
            let model_id = request.model.clone().unwrap_or(existing.model_id);
            return Ok((conversation_id, language, model_id));
        }

        let language = request.language.unwrap_or(self.config.default_language);
        let model_id = request.model.clone().unwrap_or_else(|| self.config.default_model_id.clone());
        let conversation_id = self.store.create(&request.requester.subject, None, language, &model_id).await?;
        Ok((conversation_id, language, model_id))
    }
}
