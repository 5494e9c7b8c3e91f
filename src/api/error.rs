//! Maps the crate-wide [`Error`] taxonomy onto HTTP status codes.
//!
//! The `Display` impl of [`Error`] never carries upstream provider payloads
//! or stack traces, so it is safe to echo directly into the response body;
//! anything more sensitive is logged via `tracing::error!` at the point the
//! error is produced, not re-logged here.

use crate::error::{Error, GenerationError, IndexError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Thin wrapper so the HTTP layer can implement `IntoResponse` for the
/// crate's error type without orphan-rule trouble.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(value: Error) -> Self {
        Self(value)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = status_and_kind(&self.0);
        let body = ErrorBody {
            error: ErrorDetail { kind, message: self.0.to_string() },
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, %status, "request failed");
        } else {
            tracing::warn!(error = %self.0, %status, "request rejected");
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}

fn status_and_kind(error: &Error) -> (StatusCode, &'static str) {
    match error {
        Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        Error::AccessDenied => (StatusCode::FORBIDDEN, "access_denied"),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        Error::IndexUnavailable(IndexError::EmbedderMismatch { .. }) => (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable"),
        Error::IndexUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable"),
        Error::Retrieval(_) => (StatusCode::BAD_GATEWAY, "retrieval_failed"),
        Error::RetrievalTimeout => (StatusCode::REQUEST_TIMEOUT, "retrieval_timeout"),
        Error::Generation(generation_error) => generation_status_and_kind(generation_error),
        Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        Error::Overloaded => (StatusCode::TOO_MANY_REQUESTS, "overloaded"),
        Error::Timeout => (StatusCode::REQUEST_TIMEOUT, "timeout"),
        Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        Error::Extraction(_) | Error::Chunking(_) | Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

const fn generation_status_and_kind(error: &GenerationError) -> (StatusCode, &'static str) {
    match error {
        GenerationError::Timeout { .. } => (StatusCode::REQUEST_TIMEOUT, "generation_timeout"),
        GenerationError::AuthOrQuota(_) => (StatusCode::BAD_GATEWAY, "generation_auth_or_quota"),
        GenerationError::ServerError { .. } => (StatusCode::BAD_GATEWAY, "generation_server_error"),
        GenerationError::UnknownModel(_) => (StatusCode::BAD_REQUEST, "unknown_model"),
        GenerationError::Transport(_) => (StatusCode::BAD_GATEWAY, "generation_transport_error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let (status, kind) = status_and_kind(&Error::Validation("empty question".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(kind, "validation");
    }

    #[test]
    fn access_denied_maps_to_forbidden() {
        let (status, _) = status_and_kind(&Error::AccessDenied);
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn index_unavailable_maps_to_service_unavailable() {
        let (status, _) = status_and_kind(&Error::IndexUnavailable(IndexError::Locked));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn overloaded_maps_to_too_many_requests() {
        let (status, _) = status_and_kind(&Error::Overloaded);
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn provider_timeout_maps_to_request_timeout() {
        let (status, _) = status_and_kind(&Error::Generation(GenerationError::Timeout { elapsed_ms: 5000 }));
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn provider_server_error_maps_to_bad_gateway() {
        let (status, _) = status_and_kind(&Error::Generation(GenerationError::ServerError { attempts: 3, message: "x".to_string() }));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
