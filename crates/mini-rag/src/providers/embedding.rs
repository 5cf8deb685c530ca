//! Embedding provider trait and the batching embedder service

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Trait for generating text embeddings
///
/// Implementations:
/// - `HashEmbedder`: in-process feature hashing (deterministic, no network)
/// - `OllamaEmbedder`: local Ollama server (nomic-embed-text)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    ///
    /// Default implementation calls `embed` sequentially.
    /// Implementations should override for better performance.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Embedding dimensions
    fn dimensions(&self) -> usize;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Per-item outcome of a batch embedding call
///
/// Indices refer to positions in the input slice. Both lists are sorted by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEmbedding {
    pub succeeded: Vec<(usize, Vec<f32>)>,
    pub failed: Vec<(usize, String)>,
}

impl BatchEmbedding {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when every input was embedded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: BatchEmbedding) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    fn fail_all(items: &[(usize, String)], reason: &str) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: items.iter().map(|(i, _)| (*i, reason.to_string())).collect(),
        }
    }
}

/// Embedding service shared by processing and queries
///
/// Splits input into sub-batches of at most `batch_size` and runs them on a
/// fixed-size pool. A failed sub-batch is retried item by item so one bad
/// text only fails itself.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    pool: Arc<Semaphore>,
    workers: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            provider,
            batch_size: batch_size.max(1),
            pool: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(provider, config.batch_size, config.worker_count())
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.provider.health_check().await
    }

    /// Embed a single text (queries)
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        check_text(text)?;

        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|_| Error::internal("embedding pool closed"))?;
        self.provider.embed(text).await
    }

    /// Embed many texts, reporting successes and failures per index
    pub async fn embed_batch(&self, texts: &[String]) -> BatchEmbedding {
        let mut result = BatchEmbedding::default();
        let mut pending = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            match check_text(text) {
                Ok(()) => pending.push((i, text.clone())),
                Err(e) => result.failed.push((i, e.to_string())),
            }
        }

        let sub_batches = pending.chunks(self.batch_size).map(|batch| self.embed_sub_batch(batch));
        for sub_result in join_all(sub_batches).await {
            result.merge(sub_result);
        }

        result.succeeded.sort_by_key(|(i, _)| *i);
        result.failed.sort_by_key(|(i, _)| *i);

        if !result.is_complete() {
            tracing::warn!(
                "Embedded {} of {} texts with {}",
                result.succeeded_count(),
                texts.len(),
                self.provider.name()
            );
        }

        result
    }

    async fn embed_sub_batch(&self, items: &[(usize, String)]) -> BatchEmbedding {
        let _permit = match self.pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => return BatchEmbedding::fail_all(items, "embedding pool closed"),
        };

        let texts: Vec<String> = items.iter().map(|(_, t)| t.clone()).collect();
        match self.provider.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == items.len() => BatchEmbedding {
                succeeded: items.iter().map(|(i, _)| *i).zip(vectors).collect(),
                failed: Vec::new(),
            },
            Ok(vectors) => {
                tracing::warn!(
                    "Provider returned {} vectors for {} texts, retrying individually",
                    vectors.len(),
                    items.len()
                );
                self.embed_individually(items).await
            }
            Err(e) if items.len() > 1 => {
                tracing::warn!(
                    "Sub-batch of {} failed ({}), retrying individually",
                    items.len(),
                    e
                );
                self.embed_individually(items).await
            }
            Err(e) => BatchEmbedding::fail_all(items, &e.to_string()),
        }
    }

    async fn embed_individually(&self, items: &[(usize, String)]) -> BatchEmbedding {
        let mut result = BatchEmbedding::default();
        for (i, text) in items {
            match self.provider.embed(text).await {
                Ok(vector) => result.succeeded.push((*i, vector)),
                Err(e) => result.failed.push((*i, e.to_string())),
            }
        }
        result
    }
}

/// Blank text never reaches a provider
fn check_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::invalid_input("cannot embed empty or blank text"));
    }
    Ok(())
}
