//! Processing and collection management endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{DeletionSummary, ProcessReport, ProcessRequest, ProjectStats, ReindexReport};

/// Process response: the report plus a short status signal
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub signal: &'static str,
    #[serde(flatten)]
    pub report: ProcessReport,
}

/// POST /process/:project_id - Chunk, embed and index a stored file
pub async fn process_file(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>> {
    tracing::info!(
        "Process {}/{} (chunk_size={}, overlap={}, reset={})",
        project_id,
        request.file_id,
        request.chunk_size,
        request.overlap_size,
        request.do_reset
    );

    let report = state
        .orchestrator()
        .process_file(&project_id, &request)
        .await?;

    Ok(Json(ProcessResponse {
        signal: report.signal(),
        report,
    }))
}

/// POST /reindex/:project_id/:file_id - Re-embed missing chunks and rebuild vectors
pub async fn reindex_file(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
) -> Result<Json<ReindexReport>> {
    let report = state
        .orchestrator()
        .reindex_file(&project_id, &file_id)
        .await?;
    Ok(Json(report))
}

/// GET /stats/:project_id - Chunk and vector counts
pub async fn project_stats(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectStats>> {
    let stats = state.orchestrator().project_stats(&project_id).await?;
    Ok(Json(stats))
}

/// DELETE /files/:project_id/:file_id
pub async fn delete_file(
    State(state): State<AppState>,
    Path((project_id, file_id)): Path<(String, String)>,
) -> Result<Json<DeletionSummary>> {
    let summary = state
        .orchestrator()
        .delete_file(&project_id, &file_id)
        .await?;
    Ok(Json(summary))
}

/// DELETE /projects/:project_id
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<DeletionSummary>> {
    let summary = state.orchestrator().delete_project(&project_id).await?;
    Ok(Json(summary))
}
