//! Search and chat endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use std::time::Instant;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{ChatResponse, QueryRequest, SearchResponse};

/// POST /search/:project_id - Ranked chunks without generation
pub async fn search(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    let results = state.orchestrator().search(&project_id, &request).await?;

    tracing::info!(
        "Search in {}: \"{}\" -> {} results",
        project_id,
        request.query,
        results.len()
    );

    Ok(Json(SearchResponse {
        query: request.query,
        total: results.len(),
        results,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// POST /chat/:project_id - Answer with sources
///
/// Fallback and empty outcomes are still 200; only a failed query
/// embedding or bad input is an error status.
pub async fn chat(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ChatResponse>> {
    let start = Instant::now();

    let outcome = state.orchestrator().query(&project_id, &request).await?;

    tracing::info!(
        "Chat in {}: \"{}\" -> {}",
        project_id,
        request.query,
        outcome.kind()
    );

    Ok(Json(ChatResponse::from_outcome(
        &request.query,
        outcome,
        start.elapsed().as_millis() as u64,
    )))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::RagConfig;
    use crate::orchestrator::RagOrchestrator;
    use crate::providers::{Embedder, HashEmbedder, LocalVectorStore};
    use crate::retrieval::{SimilarityMetric, VectorIndex};
    use crate::server::{state::AppState, RagServer};
    use crate::storage::ChunkStore;
    use crate::types::ProcessOptions;

    async fn app() -> axum::Router {
        let embedder = Arc::new(Embedder::new(Arc::new(HashEmbedder::new(32)), 8, 1));
        let index = Arc::new(VectorIndex::in_memory(32, SimilarityMetric::Cosine));
        let orchestrator = RagOrchestrator::new(
            embedder,
            ChunkStore::in_memory().unwrap(),
            Arc::new(LocalVectorStore::new(index)),
        );
        orchestrator
            .process_text(
                "demo",
                "guide.txt",
                "Cargo builds Rust packages and resolves their dependencies.",
                HashMap::new(),
                ProcessOptions::default(),
            )
            .await
            .unwrap();

        RagServer::with_state(AppState::from_parts(RagConfig::default(), orchestrator))
            .build_router()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_without_llm_returns_search_results() {
        let response = app()
            .await
            .oneshot(post_json(
                "/api/v1/data/chat/demo",
                serde_json::json!({"query": "how does cargo resolve dependencies?"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["answer"].is_null());
        assert_eq!(body["kind"], "fallback_results");
        assert!(body["warning"].is_string());
        assert_eq!(body["search_results"].as_array().unwrap().len(), 1);
        assert_eq!(body["search_results"][0]["file_id"], "guide.txt");
    }

    #[tokio::test]
    async fn test_search_and_stats() {
        let router = app().await;

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/v1/data/search/demo",
                serde_json::json!({"query": "cargo", "top_k": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["total"], 1);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/data/stats/demo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total_chunks"], 1);
        assert_eq!(body["indexed_vectors"], 1);
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let response = app()
            .await
            .oneshot(post_json(
                "/api/v1/data/chat/demo",
                serde_json::json!({"query": "  "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_process_missing_file_is_unprocessable() {
        let response = app()
            .await
            .oneshot(post_json(
                "/api/v1/data/process/demo",
                serde_json::json!({"file_id": "missing-file-for-route-test.txt"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
