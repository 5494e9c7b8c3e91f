//! HTTP API Layer: binds the [`Orchestrator`](crate::orchestrator::Orchestrator)
//! and [`ConversationStore`](crate::storage::ConversationStore) to the
//! JSON/HTTP contract, and maps every error back onto a status code
//! per the error taxonomy below.
//!
//! Not present in the system this codebase grew from; added because a
//! request/response engine needs a transport. Built on `axum`, matching the
//! ambient stack additions.

pub mod error;
mod handlers;
mod identity;

pub use error::ApiError;

use crate::config::AppConfig;
use crate::orchestrator::Orchestrator;
use crate::storage::ConversationStore;
use axum::Router;
use axum::http::HeaderName;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state behind every handler; cheap to clone (everything is an `Arc`
/// or a plain `bool`/`Semaphore` handle).
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    store: Arc<ConversationStore>,
    config: Arc<AppConfig>,
    request_permits: Arc<Semaphore>,
    indexes_loaded: bool,
}

impl AppState {
    /// Builds API state over already-constructed collaborators.
    /// `request_permits` enforces `config.max_concurrent_requests` as a
    /// worker-pool bound ("Overload" admission control).
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, store: Arc<ConversationStore>, config: Arc<AppConfig>) -> Self {
        let request_permits = Arc::new(Semaphore::new(config.max_concurrent_requests));
        Self {
            orchestrator,
            store,
            config,
            request_permits,
            indexes_loaded: true,
        }
    }
}

/// Builds the full router: the five routes, with the ambient
/// middleware stack layered over them (request-id assignment and
/// propagation, HTTP tracing, permissive CORS).
#[must_use]
pub fn create_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id_header));

    Router::new()
        .route("/query", post(handlers::post_query))
        .route("/conversations", get(handlers::get_conversations))
        .route("/conversations/{id}", get(handlers::get_conversation))
        .route("/products", get(handlers::get_products))
        .route("/health", get(handlers::get_health))
        .with_state(state)
        .layer(middleware)
        .layer(CorsLayer::permissive())
}

/// Binds `bind_addr` and serves `router` until the process is terminated.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn start_server(router: Router, bind_addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "verifyr HTTP API listening");
    axum::serve(listener, router).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::embedding::HashEmbedder;
    use crate::embedding::Embedder;
    use crate::generation::GenerationDispatcher;
    use crate::model::{Chunk, DocType};
    use crate::retrieval::HybridRetriever;
    use crate::search::LexicalIndex;
    use crate::search::rrf::RrfConfig;
    use crate::search::vector::VectorIndex;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_state() -> AppState {
        let chunk = Chunk {
            chunk_id: "Apple Watch Series 11_specifications_p9_c0".to_string(),
            product_name: "Apple Watch Series 11".to_string(),
            doc_type: DocType::Specifications,
            page_num: 9,
            source_file: "specifications.pdf".to_string(),
            source_url: None,
            source_name: None,
            chunk_index: 0,
            text: "18 hours battery life on a single charge".to_string(),
        };
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let vector_embedding = embedder.embed(&chunk.text).unwrap();
        let lexical = Arc::new(LexicalIndex::build(std::slice::from_ref(&chunk)));
        let vector = Arc::new(VectorIndex::build(std::slice::from_ref(&chunk), &[vector_embedding], "hash-fallback-v1", 16).unwrap());
        let chunks: HashMap<String, Chunk> = std::iter::once((chunk.chunk_id.clone(), chunk)).collect();

        let retriever = Arc::new(HybridRetriever::new(lexical, vector, embedder, Arc::new(chunks), 20, RrfConfig::default(), Duration::from_secs(2)));

        let mut config = AppConfig::default();
        config.known_products.push(crate::config::ProductAliases {
            name: "Apple Watch Series 11".to_string(),
            aliases: vec![],
        });
        config.provider_pricing.insert(
            "test-model".to_string(),
            crate::config::ModelPricing { input_per_mtok: 1.0, output_per_mtok: 1.0 },
        );
        config.default_model_id = "test-model".to_string();
        let config = Arc::new(config);

        let dispatcher = Arc::new(GenerationDispatcher::new(vec![], &config, Duration::from_secs(5)));
        let store = Arc::new(ConversationStore::in_memory().unwrap());
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&config), retriever, dispatcher, store.clone()));

        AppState::new(orchestrator, store, config)
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let router = create_router(test_state());
        let response = router.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("\"indexes_loaded\":true"));
    }

    #[tokio::test]
    async fn products_endpoint_lists_known_products() {
        let router = create_router(test_state());
        let response = router.oneshot(Request::builder().uri("/products").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("Apple Watch Series 11"));
    }

    #[tokio::test]
    async fn query_with_empty_question_is_bad_request() {
        let router = create_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from("{\"question\": \"\"}"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_conversation_is_not_found() {
        let router = create_router(test_state());
        let request = Request::builder().uri(format!("/conversations/{}", Uuid::new_v4())).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
