//! Vector store provider trait for storing and searching embeddings

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::retrieval::SearchHit;
use crate::types::VectorRecord;

/// Trait for per-project vector storage and similarity search
///
/// Implementations:
/// - `LocalVectorStore`: in-process index persisted as JSON per project
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert or replace records by chunk ID
    async fn upsert(&self, project_id: &str, records: Vec<VectorRecord>) -> Result<usize>;

    /// Atomically swap every record of a file; returns `(removed, inserted)`
    async fn replace_file(
        &self,
        project_id: &str,
        file_id: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(usize, usize)>;

    /// Search for the most similar chunks in a project
    async fn search(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        top_k: usize,
        file_id: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    async fn delete_file(&self, project_id: &str, file_id: &str) -> Result<usize>;

    async fn delete_project(&self, project_id: &str) -> Result<usize>;

    async fn count(&self, project_id: &str) -> Result<usize>;

    async fn count_file(&self, project_id: &str, file_id: &str) -> Result<usize>;

    async fn file_counts(&self, project_id: &str) -> Result<HashMap<String, usize>>;

    /// Fail if the project's collection is unusable
    async fn ensure_healthy(&self, project_id: &str) -> Result<()>;

    /// Projects that failed to load, with the reason
    fn corrupted_projects(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
