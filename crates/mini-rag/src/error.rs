//! Error types for the RAG pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::ProcessingStage;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// Counts reached by a processing run before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PartialCounts {
    pub chunks_count: usize,
    pub embeddings_generated: usize,
    pub chunks_saved: usize,
}

/// RAG pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad chunk size, overlap, top_k, threshold or other settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input the pipeline cannot work with (empty text to embed, bad identifiers)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector dimension does not match the configured index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Loader could not produce text from a source file
    #[error("Unreadable source '{path}': {reason}")]
    UnreadableSource { path: String, reason: String },

    /// Query embedding failed, nothing can be retrieved
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// No generation backend is configured
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Generation backend call failed
    #[error("Generation failed: {0}")]
    GenerationError(String),

    /// A project's persisted collection could not be loaded
    #[error("Index corruption in project '{project_id}': {reason}")]
    IndexCorruption { project_id: String, reason: String },

    /// File already has chunks and the request did not ask for a reset
    #[error("File '{file_id}' in project '{project_id}' already has {existing} chunks; reprocess with do_reset")]
    AlreadyProcessed {
        project_id: String,
        file_id: String,
        existing: usize,
    },

    /// Processing stopped before the chunk text was durable
    #[error("Processing failed at stage {stage:?}: {reason}")]
    ProcessingFailed {
        stage: ProcessingStage,
        reason: String,
        counts: PartialCounts,
    },

    /// Embedding backend error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Chunk store (SQLite) error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an unreadable source error
    pub fn unreadable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnreadableSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an index corruption error
    pub fn corruption(project_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IndexCorruption {
            project_id: project_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationError(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::InvalidConfiguration(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_configuration", msg.clone())
            }
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            Error::DimensionMismatch { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "dimension_mismatch",
                self.to_string(),
            ),
            Error::UnreadableSource { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unreadable_source",
                self.to_string(),
            ),
            Error::RetrievalUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "retrieval_unavailable",
                msg.clone(),
            ),
            Error::GenerationUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "generation_unavailable",
                msg.clone(),
            ),
            Error::GenerationError(msg) => {
                (StatusCode::BAD_GATEWAY, "generation_error", msg.clone())
            }
            Error::IndexCorruption { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "index_corruption",
                self.to_string(),
            ),
            Error::AlreadyProcessed { .. } => {
                (StatusCode::CONFLICT, "already_processed", self.to_string())
            }
            Error::ProcessingFailed {
                stage,
                reason,
                counts,
            } => {
                let body = Json(json!({
                    "error": {
                        "type": "processing_failed",
                        "message": reason,
                        "stage": stage,
                        "counts": counts,
                    }
                }));
                return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
            }
            Error::Embedding(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "embedding_error", msg.clone())
            }
            Error::Storage(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg.clone())
            }
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let response = Error::invalid_config("overlap >= chunk_size").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = Error::RetrievalUnavailable("down".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = Error::AlreadyProcessed {
            project_id: "p".into(),
            file_id: "f".into(),
            existing: 3,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
