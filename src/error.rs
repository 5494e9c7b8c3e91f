//! Error types for Verifyr.
//!
//! Mirrors the error taxonomy a request can fail with, one variant family
//! per component group, so the HTTP layer (`api::error`) can map each to a
//! status code without re-deriving the mapping from strings.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Verifyr operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range request input (empty question, unknown
    /// model id, malformed UUID). Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requester is not the conversation's owner, it is not owned by
    /// `"anonymous"`, and the requester is not an admin.
    #[error("access denied")]
    AccessDenied,

    /// No conversation exists for the given id.
    #[error("conversation not found: {0}")]
    NotFound(String),

    /// An index artifact is absent, locked by another writer, or was built
    /// with a different embedder than the one configured.
    #[error("index unavailable: {0}")]
    IndexUnavailable(#[from] IndexError),

    /// Both retrieval arms (lexical, vector) failed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// Retrieval did not complete within its soft deadline.
    #[error("retrieval timed out")]
    RetrievalTimeout,

    /// The selected language-model provider failed to produce an answer.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// A conversation-store operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// The worker pool has no capacity for another request.
    #[error("overloaded")]
    Overloaded,

    /// The request's end-to-end deadline expired.
    #[error("request timed out")]
    Timeout,

    /// The configuration file or environment carried an invalid or unknown option.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure extracting page text from a source PDF.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Failure segmenting page text into chunks.
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Underlying I/O failure not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons an index (lexical or vector) is unavailable.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The on-disk artifact does not exist.
    #[error("index artifact missing at {path}")]
    Missing {
        /// Path that was expected to contain the artifact.
        path: String,
    },

    /// The vector store's exclusive file lock is held by another process.
    #[error("vector store is locked by another writer")]
    Locked,

    /// The embedder persisted with the index does not match the one configured.
    #[error("embedder mismatch: index was built with '{built_with}' ({built_dim} dims), configured embedder is '{configured}' ({configured_dim} dims)")]
    EmbedderMismatch {
        /// Embedder name recorded in the index metadata.
        built_with: String,
        /// Dimension recorded in the index metadata.
        built_dim: usize,
        /// Embedder name currently configured.
        configured: String,
        /// Dimension of the currently configured embedder.
        configured_dim: usize,
    },

    /// A lower-level I/O or (de)serialization failure while reading the index.
    #[error("index I/O error: {0}")]
    Io(String),
}

/// Reasons a generation call failed.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The provider did not respond before the request deadline.
    #[error("provider timeout after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the call was abandoned.
        elapsed_ms: u64,
    },

    /// Authentication or quota failure; never retried.
    #[error("provider auth/quota error: {0}")]
    AuthOrQuota(String),

    /// Transient server-side error from the provider, retried up to twice.
    #[error("provider server error after {attempts} attempt(s): {message}")]
    ServerError {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The last error message returned by the provider.
        message: String,
    },

    /// `model_id` does not match any configured provider/pricing entry.
    #[error("unknown model id: {0}")]
    UnknownModel(String),

    /// Any other transport-level failure talking to the provider.
    #[error("provider request failed: {0}")]
    Transport(String),
}

/// Reasons a conversation-store operation failed.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(String),

    /// A concurrent append lost a race and must be retried by the caller.
    #[error("conflicting concurrent append to conversation {0}")]
    Conflict(String),

    /// An append would violate the user/assistant role-alternation invariant.
    #[error("message role {attempted} does not continue alternation (expected {expected})")]
    RoleAlternation {
        /// The role the caller attempted to append.
        attempted: String,
        /// The role that would have continued the alternation.
        expected: String,
    },

    /// Serialization/deserialization error for a stored message or conversation.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Database(value.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(StoreError::from(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_into_top_level() {
        let err: Error = IndexError::Locked.into();
        assert!(matches!(err, Error::IndexUnavailable(IndexError::Locked)));
    }

    #[test]
    fn generation_error_into_top_level() {
        let err: Error = GenerationError::UnknownModel("gpt-ghost".to_string()).into();
        assert!(matches!(err, Error::Generation(GenerationError::UnknownModel(_))));
    }

    #[test]
    fn store_error_displays_conflict() {
        let err = StoreError::Conflict("abc-123".to_string());
        assert_eq!(err.to_string(), "conflicting concurrent append to conversation abc-123");
    }
}
