//! API routes for the RAG server

pub mod data;
pub mod query;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes (mounted under `/api/v1/data`)
pub fn api_routes(max_body_size: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(info))
        // Processing
        .route("/process/:project_id", post(data::process_file))
        .route("/reindex/:project_id/:file_id", post(data::reindex_file))
        // Retrieval
        .route("/search/:project_id", post(query::search))
        .route("/chat/:project_id", post(query::chat))
        // Collection management
        .route("/stats/:project_id", get(data::project_stats))
        .route("/files/:project_id/:file_id", delete(data::delete_file))
        .route("/projects/:project_id", delete(data::delete_project))
        .layer(DefaultBodyLimit::max(max_body_size))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "mini-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Chunk, embed and index project files; answer questions with retrieved context",
        "endpoints": {
            "POST /api/v1/data/process/:project_id": "Chunk, embed and index a stored file",
            "POST /api/v1/data/reindex/:project_id/:file_id": "Rebuild a file's vectors from stored chunks",
            "POST /api/v1/data/search/:project_id": "Ranked chunks for a query",
            "POST /api/v1/data/chat/:project_id": "Answer with sources, or ranked chunks when generation is unavailable",
            "GET /api/v1/data/stats/:project_id": "Chunk and vector counts per file",
            "DELETE /api/v1/data/files/:project_id/:file_id": "Remove a file's chunks and vectors",
            "DELETE /api/v1/data/projects/:project_id": "Remove a whole project"
        }
    }))
}
