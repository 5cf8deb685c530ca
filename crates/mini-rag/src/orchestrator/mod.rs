//! RAG orchestrator: ties chunking, embedding, storage, retrieval and generation
//!
//! Processing runs `Chunked -> Embedding -> Persisted -> Indexed -> Done`
//! per file; chunk text is always made durable before vectors are indexed.
//! Queries run `Received -> Embedded -> Retrieved -> Generated | Fallback`.

mod process;
mod query;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, RwLock};

use crate::config::{RagConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::ingestion::{DocumentLoader, TextChunker, TextFileLoader};
use crate::providers::{
    build_embedding_provider, build_llm_provider, Embedder, GenerationConfig, LlmProvider,
    LocalVectorStore, VectorStoreProvider,
};
use crate::storage::ChunkStore;
use crate::types::{DeletionSummary, FileStats, ProjectStats};

const MAX_ID_LEN: usize = 128;

static ID_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").ok());

/// Check a project or file identifier
///
/// Identifiers become path components, so they are restricted to
/// `[A-Za-z0-9][A-Za-z0-9._-]*` and at most 128 characters.
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(Error::invalid_input(format!(
            "{} must be 1-{} characters",
            kind, MAX_ID_LEN
        )));
    }
    let valid = ID_PATTERN
        .as_ref()
        .map(|re| re.is_match(id))
        .unwrap_or(false);
    if !valid {
        return Err(Error::invalid_input(format!(
            "{} '{}' may only contain letters, digits, '.', '_' and '-'",
            kind, id
        )));
    }
    Ok(())
}

/// Component health for the readiness endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub chunk_store: bool,
    pub vector_store: bool,
    pub embedder: bool,
    /// Generation backend name, `None` when queries fall back to search results
    pub generation: Option<String>,
    pub corrupted_projects: Vec<CorruptedProject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorruptedProject {
    pub project_id: String,
    pub reason: String,
}

/// Coordinates the pipeline for all projects
///
/// Shared read-only after construction. Per-file work is serialized with a
/// lock keyed by `(project_id, file_id)` and holds its project's lock shared;
/// deleting a project takes that lock exclusively.
pub struct RagOrchestrator {
    chunker: TextChunker,
    embedder: Arc<Embedder>,
    chunk_store: ChunkStore,
    vector_store: Arc<dyn VectorStoreProvider>,
    llm: Option<Arc<dyn LlmProvider>>,
    generation: GenerationConfig,
    generation_timeout: Duration,
    retrieval: RetrievalConfig,
    loader: Arc<dyn DocumentLoader>,
    files_dir: PathBuf,
    project_locks: DashMap<String, Arc<RwLock<()>>>,
    file_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held for the duration of one file operation
type FileGuard = (OwnedRwLockReadGuard<()>, OwnedMutexGuard<()>);

impl RagOrchestrator {
    /// Create with default chunking, retrieval and no generation backend
    pub fn new(
        embedder: Arc<Embedder>,
        chunk_store: ChunkStore,
        vector_store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        let defaults = RagConfig::default();
        Self {
            chunker: TextChunker::from_config(&defaults.chunking),
            embedder,
            chunk_store,
            vector_store,
            llm: None,
            generation: GenerationConfig::from(&defaults.llm),
            generation_timeout: Duration::from_secs(defaults.llm.timeout_secs),
            retrieval: defaults.retrieval,
            loader: Arc::new(TextFileLoader::new()),
            files_dir: defaults.storage.files_dir(),
            project_locks: DashMap::new(),
            file_locks: DashMap::new(),
        }
    }

    /// Build every component from configuration
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        config.validate()?;

        let provider = build_embedding_provider(&config.embeddings)?;
        if provider.dimensions() != config.embeddings.dimensions {
            return Err(Error::invalid_config(format!(
                "embedding provider produces {} dimensions, index expects {}",
                provider.dimensions(),
                config.embeddings.dimensions
            )));
        }
        let embedder = Arc::new(Embedder::from_config(provider, &config.embeddings));

        let chunk_store = ChunkStore::new(config.storage.chunk_db_path())?;
        let vector_store = Arc::new(LocalVectorStore::from_config(config)?);

        for (project_id, reason) in vector_store.corrupted_projects() {
            tracing::error!("Collection '{}' isolated: {}", project_id, reason);
        }

        Ok(Self::new(embedder, chunk_store, vector_store)
            .with_chunker(TextChunker::from_config(&config.chunking))
            .with_retrieval(config.retrieval.clone())
            .with_generation(
                GenerationConfig::from(&config.llm),
                Duration::from_secs(config.llm.timeout_secs),
            )
            .with_llm(build_llm_provider(&config.llm))
            .with_files_dir(config.storage.files_dir()))
    }

    pub fn with_chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Set sampling settings and the per-call generation timeout
    pub fn with_generation(mut self, generation: GenerationConfig, timeout: Duration) -> Self {
        self.generation = generation;
        self.generation_timeout = timeout;
        self
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Directory holding uploaded files as `<project_id>/<file_id>`
    pub fn with_files_dir(mut self, files_dir: impl Into<PathBuf>) -> Self {
        self.files_dir = files_dir.into();
        self
    }

    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    pub fn has_generation(&self) -> bool {
        self.llm.is_some()
    }

    /// Remove a file's vectors and chunks
    pub async fn delete_file(&self, project_id: &str, file_id: &str) -> Result<DeletionSummary> {
        validate_id("project_id", project_id)?;
        validate_id("file_id", file_id)?;

        let _guard = self.lock_file(project_id, file_id).await;

        let summary = self.remove_file(project_id, file_id).await?;
        tracing::info!(
            "Deleted {}/{}: {} chunks, {} vectors",
            project_id,
            file_id,
            summary.chunks_deleted,
            summary.vectors_deleted
        );
        Ok(summary)
    }

    /// Remove a whole project, including a collection isolated as corrupted
    ///
    /// Waits for in-flight file operations in the project to finish.
    pub async fn delete_project(&self, project_id: &str) -> Result<DeletionSummary> {
        validate_id("project_id", project_id)?;

        let _guard = self.project_lock(project_id).write_owned().await;

        let vectors_deleted = self.vector_store.delete_project(project_id).await?;
        let project = project_id.to_string();
        let chunks_deleted = self
            .with_store(move |store| store.delete_project(&project))
            .await?;

        tracing::info!(
            "Deleted project {}: {} chunks, {} vectors",
            project_id,
            chunks_deleted,
            vectors_deleted
        );
        Ok(DeletionSummary {
            chunks_deleted,
            vectors_deleted,
        })
    }

    /// Chunk and vector counts for a project, per file
    pub async fn project_stats(&self, project_id: &str) -> Result<ProjectStats> {
        validate_id("project_id", project_id)?;

        let project = project_id.to_string();
        let chunk_counts = self
            .with_store(move |store| store.file_counts(&project))
            .await?;
        let mut vector_counts = self.vector_store.file_counts(project_id).await?;

        let mut files: Vec<FileStats> = chunk_counts
            .into_iter()
            .map(|c| FileStats {
                indexed_vectors: vector_counts.remove(&c.file_id).unwrap_or(0),
                file_id: c.file_id,
                chunks: c.chunks,
                embedded_chunks: c.embedded,
            })
            .collect();

        // Vectors whose chunks are gone should not exist, but report them if they do
        for (file_id, indexed_vectors) in vector_counts {
            tracing::warn!("Vectors for {}/{} have no stored chunks", project_id, file_id);
            files.push(FileStats {
                file_id,
                chunks: 0,
                embedded_chunks: 0,
                indexed_vectors,
            });
        }
        files.sort_by(|a, b| a.file_id.cmp(&b.file_id));

        Ok(ProjectStats {
            project_id: project_id.to_string(),
            total_chunks: files.iter().map(|f| f.chunks).sum(),
            indexed_vectors: files.iter().map(|f| f.indexed_vectors).sum(),
            unique_files: files.iter().filter(|f| f.chunks > 0).count(),
            files,
        })
    }

    /// Projects whose collection failed to load at startup
    pub fn corrupted_projects(&self) -> Vec<CorruptedProject> {
        self.vector_store
            .corrupted_projects()
            .into_iter()
            .map(|(project_id, reason)| CorruptedProject { project_id, reason })
            .collect()
    }

    /// Probe every component
    pub async fn readiness(&self) -> Readiness {
        let store = self.chunk_store.clone();
        let chunk_store = tokio::task::spawn_blocking(move || store.health_check())
            .await
            .unwrap_or(false);
        let vector_store = self.vector_store.health_check().await.unwrap_or(false);
        let embedder = self.embedder.health_check().await.unwrap_or(false);

        Readiness {
            ready: chunk_store && vector_store && embedder,
            chunk_store,
            vector_store,
            embedder,
            generation: self.llm.as_ref().map(|l| format!("{} ({})", l.name(), l.model())),
            corrupted_projects: self.corrupted_projects(),
        }
    }

    /// Vectors first so the index never points at chunks that are gone
    async fn remove_file(&self, project_id: &str, file_id: &str) -> Result<DeletionSummary> {
        let vectors_deleted = self.vector_store.delete_file(project_id, file_id).await?;

        let (project, file) = (project_id.to_string(), file_id.to_string());
        let chunks_deleted = self
            .with_store(move |store| store.delete_by_file(&project, &file))
            .await?;

        Ok(DeletionSummary {
            chunks_deleted,
            vectors_deleted,
        })
    }

    fn project_lock(&self, project_id: &str) -> Arc<RwLock<()>> {
        self.project_locks
            .entry(project_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Project lock (shared) first, then the file lock
    async fn lock_file(&self, project_id: &str, file_id: &str) -> FileGuard {
        let project = self.project_lock(project_id).read_owned().await;
        let file = self
            .file_locks
            .entry(format!("{}/{}", project_id, file_id))
            .or_default()
            .value()
            .clone();
        (project, file.lock_owned().await)
    }

    /// Run a chunk store call on the blocking pool
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ChunkStore) -> Result<T> + Send + 'static,
    {
        let store = self.chunk_store.clone();
        tokio::task::spawn_blocking(move || op(&store)).await?
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::providers::{EmbeddingProvider, HashEmbedder};
    use crate::retrieval::{SimilarityMetric, VectorIndex};

    pub const DIMS: usize = 64;

    pub fn orchestrator_with(provider: Arc<dyn EmbeddingProvider>) -> RagOrchestrator {
        let embedder = Arc::new(Embedder::new(provider, 4, 2));
        let index = Arc::new(VectorIndex::in_memory(DIMS, SimilarityMetric::Cosine));
        RagOrchestrator::new(
            embedder,
            ChunkStore::in_memory().unwrap(),
            Arc::new(LocalVectorStore::new(index)),
        )
    }

    pub fn orchestrator() -> RagOrchestrator {
        orchestrator_with(Arc::new(HashEmbedder::new(DIMS)))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{orchestrator, orchestrator_with, DIMS};
    use super::*;
    use crate::providers::{EmbeddingProvider, HashEmbedder};
    use crate::types::ProcessOptions;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::{Notify, Semaphore};

    /// Hash embeddings that wait for a permit after signalling they started
    struct GatedEmbedder {
        inner: HashEmbedder,
        started: Arc<Notify>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl EmbeddingProvider for GatedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.started.notify_one();
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| Error::internal("gate closed"))?;
            permit.forget();
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("project_id", "proj-1").is_ok());
        assert!(validate_id("file_id", "notes.v2_final.md").is_ok());

        for bad in ["", ".hidden", "../etc", "a/b", "has space", "-dash"] {
            assert!(
                matches!(validate_id("file_id", bad), Err(Error::InvalidInput(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(validate_id("project_id", &"a".repeat(129)).is_err());
        assert!(validate_id("project_id", &"a".repeat(128)).is_ok());
    }

    #[tokio::test]
    async fn test_stats_and_deletion() {
        let rag = orchestrator();
        let text = "Ownership rules govern memory. ".repeat(40);
        let options = ProcessOptions {
            chunk_size: 300,
            overlap: 50,
            do_reset: false,
        };

        let a = rag
            .process_text("p", "a.txt", &text, HashMap::new(), options)
            .await
            .unwrap();
        rag.process_text("p", "b.txt", "Short note about lifetimes.", HashMap::new(), options)
            .await
            .unwrap();

        let stats = rag.project_stats("p").await.unwrap();
        assert_eq!(stats.unique_files, 2);
        assert_eq!(stats.total_chunks, a.chunks_count + 1);
        assert_eq!(stats.indexed_vectors, stats.total_chunks);
        assert_eq!(stats.files[0].file_id, "a.txt");

        let removed = rag.delete_file("p", "a.txt").await.unwrap();
        assert_eq!(removed.chunks_deleted, a.chunks_count);
        assert_eq!(removed.vectors_deleted, a.chunks_count);

        let stats = rag.project_stats("p").await.unwrap();
        assert_eq!(stats.unique_files, 1);
        assert_eq!(stats.total_chunks, 1);

        let removed = rag.delete_project("p").await.unwrap();
        assert_eq!(removed.chunks_deleted, 1);
        assert_eq!(rag.project_stats("p").await.unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_project_deletion_waits_for_in_flight_processing() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Semaphore::new(0));
        let rag = Arc::new(orchestrator_with(Arc::new(GatedEmbedder {
            inner: HashEmbedder::new(DIMS),
            started: started.clone(),
            gate: gate.clone(),
        })));

        let processing = tokio::spawn({
            let rag = rag.clone();
            async move {
                rag.process_text(
                    "p",
                    "a.txt",
                    "Lifetimes name the scope a reference is valid for.",
                    HashMap::new(),
                    ProcessOptions::default(),
                )
                .await
            }
        });
        started.notified().await;

        let deleting = tokio::spawn({
            let rag = rag.clone();
            async move { rag.delete_project("p").await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!deleting.is_finished());

        gate.add_permits(16);
        let report = processing.await.unwrap().unwrap();
        assert_eq!(report.chunks_saved, 1);

        let removed = deleting.await.unwrap().unwrap();
        assert_eq!(removed.chunks_deleted, 1);
        assert_eq!(removed.vectors_deleted, 1);
        assert_eq!(rag.chunk_store.count("p", "a.txt").unwrap(), 0);
        assert_eq!(rag.vector_store.count("p").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_readiness_without_llm() {
        let rag = orchestrator();
        let readiness = rag.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.generation.is_none());
        assert!(readiness.corrupted_projects.is_empty());
    }
}
