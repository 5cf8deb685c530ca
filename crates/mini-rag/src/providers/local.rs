//! Local vector store backed by the in-process index
//!
//! Index operations are synchronous and may write to disk, so each call
//! runs on the blocking pool.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::retrieval::{SearchHit, VectorIndex};
use crate::types::VectorRecord;

use super::vector_store::VectorStoreProvider;

pub struct LocalVectorStore {
    index: Arc<VectorIndex>,
}

impl LocalVectorStore {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    /// Open the persisted index under the configured data directory
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let index = VectorIndex::open(
            config.storage.vector_dir(),
            config.embeddings.dimensions,
            config.vector_index.metric,
        )?;
        Ok(Self::new(Arc::new(index)))
    }

    pub fn inner(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&VectorIndex) -> Result<T> + Send + 'static,
    {
        let index = self.index.clone();
        tokio::task::spawn_blocking(move || op(index.as_ref())).await?
    }
}

#[async_trait]
impl VectorStoreProvider for LocalVectorStore {
    async fn upsert(&self, project_id: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let project_id = project_id.to_string();
        self.blocking(move |index| index.upsert(&project_id, records))
            .await
    }

    async fn replace_file(
        &self,
        project_id: &str,
        file_id: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(usize, usize)> {
        let project_id = project_id.to_string();
        let file_id = file_id.to_string();
        self.blocking(move |index| index.replace_file(&project_id, &file_id, records))
            .await
    }

    async fn search(
        &self,
        project_id: &str,
        query_embedding: &[f32],
        top_k: usize,
        file_id: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        // Searches only read an in-memory snapshot
        self.index.search(project_id, query_embedding, top_k, file_id)
    }

    async fn delete_file(&self, project_id: &str, file_id: &str) -> Result<usize> {
        let project_id = project_id.to_string();
        let file_id = file_id.to_string();
        self.blocking(move |index| index.delete_file(&project_id, &file_id))
            .await
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let project_id = project_id.to_string();
        self.blocking(move |index| index.delete_project(&project_id))
            .await
    }

    async fn count(&self, project_id: &str) -> Result<usize> {
        self.index.count(project_id)
    }

    async fn count_file(&self, project_id: &str, file_id: &str) -> Result<usize> {
        self.index.count_file(project_id, file_id)
    }

    async fn file_counts(&self, project_id: &str) -> Result<HashMap<String, usize>> {
        self.index.file_counts(project_id)
    }

    async fn ensure_healthy(&self, project_id: &str) -> Result<()> {
        self.index.ensure_healthy(project_id)
    }

    fn corrupted_projects(&self) -> Vec<(String, String)> {
        self.index.corrupted_projects()
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SimilarityMetric;
    use uuid::Uuid;

    fn record(file_id: &str, order: u32, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: Uuid::new_v4(),
            vector,
            project_id: "p".to_string(),
            file_id: file_id.to_string(),
            order,
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_provider() {
        let store = LocalVectorStore::new(Arc::new(VectorIndex::in_memory(
            2,
            SimilarityMetric::Cosine,
        )));

        store
            .upsert("p", vec![record("a", 0, vec![1.0, 0.0]), record("b", 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = store.search("p", &[1.0, 0.1], 1, None).await.unwrap();
        assert_eq!(hits[0].file_id, "a");

        let (removed, inserted) = store
            .replace_file("p", "a", vec![record("a", 0, vec![0.5, 0.5]), record("a", 1, vec![0.2, 0.8])])
            .await
            .unwrap();
        assert_eq!((removed, inserted), (1, 2));
        assert_eq!(store.count("p").await.unwrap(), 3);

        assert_eq!(store.delete_file("p", "b").await.unwrap(), 1);
        assert_eq!(store.file_counts("p").await.unwrap().get("a"), Some(&2));
        assert_eq!(store.delete_project("p").await.unwrap(), 2);
        assert_eq!(store.count("p").await.unwrap(), 0);
    }
}
