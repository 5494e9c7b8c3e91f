//! Request handlers and wire DTOs for the five HTTP endpoints.

use super::AppState;
use super::error::ApiError;
use crate::error::Error;
use crate::model::{Conversation, Language, RequestIdentity, Source, TokenUsage};
use crate::orchestrator::{QueryRequest, QueryResponse};
use crate::storage::ConversationSummary;
use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /query` request body.
#[derive(Debug, Deserialize)]
pub struct QueryRequestBody {
    question: String,
    conversation_id: Option<Uuid>,
    model: Option<String>,
    language: Option<Language>,
}

/// `POST /query` response body.
#[derive(Debug, Serialize)]
pub struct QueryResponseBody {
    answer: String,
    sources: Vec<Source>,
    conversation_id: Uuid,
    response_time_ms: u64,
    model_used: String,
    tokens_used: TokenUsage,
    cost_usd: f64,
}

impl From<QueryResponse> for QueryResponseBody {
    fn from(value: QueryResponse) -> Self {
        Self {
            answer: value.answer,
            sources: value.sources,
            conversation_id: value.conversation_id,
            response_time_ms: value.response_time_ms,
            model_used: value.model_used,
            tokens_used: value.tokens_used,
            cost_usd: value.cost_usd,
        }
    }
}

/// `GET /conversations` list entry.
#[derive(Debug, Serialize)]
pub struct ConversationSummaryBody {
    conversation_id: Uuid,
    owner_id: String,
    language: Language,
    model_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    message_count: usize,
}

impl From<ConversationSummary> for ConversationSummaryBody {
    fn from(value: ConversationSummary) -> Self {
        Self {
            conversation_id: value.conversation_id,
            owner_id: value.owner_id,
            language: value.language,
            model_id: value.model_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
            message_count: value.message_count,
        }
    }
}

/// `GET /products` response body.
#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    products: Vec<String>,
}

/// `GET /health` response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    indexes_loaded: bool,
}

/// Handles `POST /query`. Admission to the worker pool is
/// gated by `AppState::request_permits`; a saturated pool fails fast with
/// [`Error::Overloaded`] rather than queuing indefinitely.
pub async fn post_query(State(state): State<AppState>, requester: RequestIdentity, Json(body): Json<QueryRequestBody>) -> std::result::Result<Json<QueryResponseBody>, ApiError> {
    let Ok(_permit) = state.request_permits.try_acquire() else {
        return Err(ApiError::from(Error::Overloaded));
    };

    let request = QueryRequest {
        question: body.question,
        conversation_id: body.conversation_id,
        model: body.model,
        language: body.language,
        requester,
    };

    let response = state.orchestrator.handle_query(request).await?;
    Ok(Json(response.into()))
}

/// Handles `GET /conversations`: the list visible to `requester`.
pub async fn get_conversations(State(state): State<AppState>, requester: RequestIdentity) -> std::result::Result<Json<Vec<ConversationSummaryBody>>, ApiError> {
    let summaries = state.store.list(&requester).await?;
    Ok(Json(summaries.into_iter().map(ConversationSummaryBody::from).collect()))
}

/// Handles `GET /conversations/{id}`: the full thread iff access is allowed.
pub async fn get_conversation(State(state): State<AppState>, requester: RequestIdentity, Path(id): Path<Uuid>) -> std::result::Result<Json<Conversation>, ApiError> {
    let conversation = state.store.get(id, &requester).await?;
    Ok(Json(conversation))
}

/// Handles `GET /products`: the known product catalog (`known_products`).
pub async fn get_products(State(state): State<AppState>) -> Json<ProductsResponse> {
    Json(ProductsResponse {
        products: state.config.known_products.iter().map(|p| p.name.clone()).collect(),
    })
}

/// Handles `GET /health`: whether both indexes are loaded and serving.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.indexes_loaded { "ok" } else { "degraded" },
        indexes_loaded: state.indexes_loaded,
    })
}
