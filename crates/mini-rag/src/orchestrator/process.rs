//! File processing: chunk, embed, persist, index

use std::collections::HashMap;
use std::time::Instant;

use crate::config::validate_chunking;
use crate::error::{Error, PartialCounts, Result};
use crate::types::{
    Chunk, DeletionSummary, EmbeddingFailure, ProcessOptions, ProcessReport, ProcessRequest,
    ProcessingStage, ReindexReport, SourceInfo, VectorRecord,
};

use super::{validate_id, RagOrchestrator};

impl RagOrchestrator {
    /// Load `<files_dir>/<project_id>/<file_id>` and process it
    pub async fn process_file(
        &self,
        project_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProcessReport> {
        validate_id("project_id", project_id)?;
        validate_id("file_id", &request.file_id)?;

        let path = self.files_dir.join(project_id).join(&request.file_id);
        let loader = self.loader.clone();
        let document = tokio::task::spawn_blocking(move || loader.load(&path)).await??;

        tracing::info!(
            "Loaded {}/{} ({} chars)",
            project_id,
            request.file_id,
            document.text.chars().count()
        );

        self.process_text(
            project_id,
            &request.file_id,
            &document.text,
            document.metadata,
            request.options(),
        )
        .await
    }

    /// Process raw text for one file
    ///
    /// Chunks are saved even when some embeddings fail; only embedded chunks
    /// are indexed. Index failures are reported, not raised, because the
    /// stored chunks can be reindexed later.
    pub async fn process_text(
        &self,
        project_id: &str,
        file_id: &str,
        text: &str,
        metadata: HashMap<String, serde_json::Value>,
        options: ProcessOptions,
    ) -> Result<ProcessReport> {
        validate_id("project_id", project_id)?;
        validate_id("file_id", file_id)?;
        validate_chunking(options.chunk_size, options.overlap)?;

        let start = Instant::now();
        let _guard = self.lock_file(project_id, file_id).await;

        let source = SourceInfo::new(project_id, file_id).with_metadata(metadata);
        let mut chunks = self
            .chunker
            .split(text, options.chunk_size, options.overlap, &source)?;
        let chunks_count = chunks.len();
        tracing::info!("Chunked {}/{} into {} chunks", project_id, file_id, chunks_count);

        if options.do_reset {
            // Fail closed: nothing is written if the collection is unusable
            self.vector_store.ensure_healthy(project_id).await?;
        } else {
            let (project, file) = (project_id.to_string(), file_id.to_string());
            let existing = self
                .with_store(move |store| store.count(&project, &file))
                .await?;
            if existing > 0 {
                return Err(Error::AlreadyProcessed {
                    project_id: project_id.to_string(),
                    file_id: file_id.to_string(),
                    existing,
                });
            }
        }

        if chunks.is_empty() {
            let reset = if options.do_reset {
                Some(self.remove_file(project_id, file_id).await.map_err(|e| {
                    Error::ProcessingFailed {
                        stage: ProcessingStage::Chunked,
                        reason: format!("reset failed: {}", e),
                        counts: PartialCounts::default(),
                    }
                })?)
            } else {
                None
            };
            tracing::info!("No content in {}/{}", project_id, file_id);

            let mut report = ProcessReport::empty(project_id, file_id, reset);
            report.processing_time_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batch = self.embedder.embed_batch(&texts).await;
        let embedding_failures: Vec<EmbeddingFailure> = batch
            .failed
            .iter()
            .map(|(i, reason)| EmbeddingFailure {
                order: chunks[*i].order,
                reason: reason.clone(),
            })
            .collect();
        let embeddings_generated = batch.succeeded_count();
        for (i, vector) in batch.succeeded {
            chunks[i].embedding = Some(vector);
        }
        tracing::info!(
            "Embedded {} of {} chunks for {}/{}",
            embeddings_generated,
            chunks_count,
            project_id,
            file_id
        );

        let mut counts = PartialCounts {
            chunks_count,
            embeddings_generated,
            chunks_saved: 0,
        };

        let records: Vec<VectorRecord> = chunks.iter().filter_map(Chunk::to_vector_record).collect();
        let (project, file) = (project_id.to_string(), file_id.to_string());
        let do_reset = options.do_reset;
        let persisted = self
            .with_store(move |store| {
                if do_reset {
                    store.replace_file(&project, &file, &chunks)
                } else {
                    store.save_batch(&chunks).map(|saved| (0, saved))
                }
            })
            .await;

        let (chunks_deleted, chunks_saved) = match persisted {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Persisting {}/{} failed: {}", project_id, file_id, e);
                return Err(Error::ProcessingFailed {
                    stage: ProcessingStage::Embedding,
                    reason: e.to_string(),
                    counts,
                });
            }
        };
        counts.chunks_saved = chunks_saved;
        tracing::info!("Persisted {} chunks for {}/{}", chunks_saved, project_id, file_id);

        let mut report = ProcessReport {
            project_id: project_id.to_string(),
            file_id: file_id.to_string(),
            stage: ProcessingStage::Persisted,
            chunks_count,
            chunks_saved,
            embeddings_generated,
            chunks_indexed: 0,
            indexed: false,
            reset: None,
            embedding_failures,
            index_error: None,
            processing_time_ms: 0,
        };

        let indexed = if do_reset {
            self.vector_store
                .replace_file(project_id, file_id, records)
                .await
        } else {
            self.vector_store
                .upsert(project_id, records)
                .await
                .map(|inserted| (0, inserted))
        };

        match indexed {
            Ok((vectors_deleted, inserted)) => {
                report.chunks_indexed = inserted;
                report.indexed = true;
                report.stage = if embeddings_generated == chunks_count {
                    ProcessingStage::Done
                } else {
                    ProcessingStage::Indexed
                };
                if do_reset {
                    report.reset = Some(DeletionSummary {
                        chunks_deleted,
                        vectors_deleted,
                    });
                }
                tracing::info!("Indexed {} vectors for {}/{}", inserted, project_id, file_id);
            }
            Err(e) => {
                tracing::error!("Indexing {}/{} failed: {}", project_id, file_id, e);
                report.index_error = Some(e.to_string());

                if do_reset {
                    // Old vectors point at chunks that were just replaced
                    let vectors_deleted = match self.vector_store.delete_file(project_id, file_id).await {
                        Ok(n) => n,
                        Err(e) => {
                            tracing::error!(
                                "Could not drop stale vectors for {}/{}: {}",
                                project_id,
                                file_id,
                                e
                            );
                            0
                        }
                    };
                    report.reset = Some(DeletionSummary {
                        chunks_deleted,
                        vectors_deleted,
                    });
                }
            }
        }

        report.processing_time_ms = start.elapsed().as_millis() as u64;
        if report.is_degraded() {
            tracing::warn!(
                "Processed {}/{} with degradation: {} of {} embedded, indexed={}",
                project_id,
                file_id,
                report.embeddings_generated,
                report.chunks_count,
                report.indexed
            );
        }
        Ok(report)
    }

    /// Rebuild a file's vectors from its stored chunks
    ///
    /// Chunks saved without an embedding are embedded now; the file's index
    /// entries are then swapped for the full embedded set.
    pub async fn reindex_file(&self, project_id: &str, file_id: &str) -> Result<ReindexReport> {
        validate_id("project_id", project_id)?;
        validate_id("file_id", file_id)?;

        let start = Instant::now();
        let _guard = self.lock_file(project_id, file_id).await;

        self.vector_store.ensure_healthy(project_id).await?;

        let (project, file) = (project_id.to_string(), file_id.to_string());
        let mut chunks = self
            .with_store(move |store| store.get_by_file(&project, &file))
            .await?;

        let missing: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_embedded())
            .map(|(i, _)| i)
            .collect();

        let mut report = ReindexReport {
            project_id: project_id.to_string(),
            file_id: file_id.to_string(),
            chunks_count: chunks.len(),
            ..Default::default()
        };

        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| chunks[i].text.clone()).collect();
            let batch = self.embedder.embed_batch(&texts).await;

            report.embedding_failures = batch
                .failed
                .iter()
                .map(|(j, reason)| EmbeddingFailure {
                    order: chunks[missing[*j]].order,
                    reason: reason.clone(),
                })
                .collect();

            let mut attached = Vec::with_capacity(batch.succeeded.len());
            for (j, vector) in batch.succeeded {
                let chunk = &mut chunks[missing[j]];
                attached.push((chunk.id, vector.clone()));
                chunk.embedding = Some(vector);
            }

            let (project, file) = (project_id.to_string(), file_id.to_string());
            report.embeddings_generated = self
                .with_store(move |store| store.attach_embeddings(&project, &file, &attached))
                .await?;
        }

        let records: Vec<VectorRecord> = chunks.iter().filter_map(Chunk::to_vector_record).collect();
        let (removed, inserted) = self
            .vector_store
            .replace_file(project_id, file_id, records)
            .await?;
        report.vectors_removed = removed;
        report.vectors_indexed = inserted;
        report.processing_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Reindexed {}/{}: {} chunks, {} newly embedded, {} vectors",
            project_id,
            file_id,
            report.chunks_count,
            report.embeddings_generated,
            report.vectors_indexed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{orchestrator, orchestrator_with, DIMS};
    use super::*;
    use crate::providers::{EmbeddingProvider, HashEmbedder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn options(chunk_size: usize, overlap: usize) -> ProcessOptions {
        ProcessOptions {
            chunk_size,
            overlap,
            do_reset: false,
        }
    }

    /// Fails texts containing a marker until switched off
    struct Switchable {
        inner: HashEmbedder,
        failing: AtomicBool,
    }

    #[async_trait]
    impl EmbeddingProvider for Switchable {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.failing.load(Ordering::SeqCst) && text.contains("BROKEN") {
                return Err(Error::embedding("model unavailable"));
            }
            self.inner.embed(text).await
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "switchable"
        }
    }

    #[tokio::test]
    async fn test_empty_text_is_success() {
        let rag = orchestrator();
        let report = rag
            .process_text("p", "empty.txt", "   \n\t ", HashMap::new(), options(100, 10))
            .await
            .unwrap();

        assert_eq!(report.chunks_count, 0);
        assert_eq!(report.stage, ProcessingStage::Done);
        assert_eq!(report.signal(), "process_no_content");
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let rag = orchestrator();
        let result = rag
            .process_text("p", "f.txt", "text", HashMap::new(), options(100, 100))
            .await;
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));

        let result = rag
            .process_text("p", "../f", "text", HashMap::new(), options(100, 10))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reprocess_requires_reset() {
        let rag = orchestrator();
        let text = "Traits define shared behavior across types.";
        rag.process_text("p", "f.txt", text, HashMap::new(), options(100, 10))
            .await
            .unwrap();

        let again = rag
            .process_text("p", "f.txt", text, HashMap::new(), options(100, 10))
            .await;
        assert!(matches!(again, Err(Error::AlreadyProcessed { existing: 1, .. })));

        let reset = ProcessOptions {
            do_reset: true,
            ..options(100, 10)
        };
        let report = rag
            .process_text("p", "f.txt", text, HashMap::new(), reset)
            .await
            .unwrap();
        assert_eq!(
            report.reset,
            Some(DeletionSummary {
                chunks_deleted: 1,
                vectors_deleted: 1
            })
        );
        assert_eq!(report.chunks_indexed, 1);
    }

    #[tokio::test]
    async fn test_reset_with_empty_text_clears_file() {
        let rag = orchestrator();
        rag.process_text("p", "f.txt", "Some content here.", HashMap::new(), options(100, 10))
            .await
            .unwrap();

        let reset = ProcessOptions {
            do_reset: true,
            ..options(100, 10)
        };
        let report = rag
            .process_text("p", "f.txt", "", HashMap::new(), reset)
            .await
            .unwrap();
        assert_eq!(report.chunks_count, 0);
        assert_eq!(report.reset.map(|r| r.chunks_deleted), Some(1));
        assert_eq!(rag.project_stats("p").await.unwrap().total_chunks, 0);
    }

    #[tokio::test]
    async fn test_reindex_fills_missing_embeddings() {
        let provider = Arc::new(Switchable {
            inner: HashEmbedder::new(DIMS),
            failing: AtomicBool::new(true),
        });
        let rag = orchestrator_with(provider.clone());

        let text = "Healthy paragraph about iterators. BROKEN paragraph about closures.";
        let report = rag
            .process_text("p", "f.txt", text, HashMap::new(), options(36, 0))
            .await
            .unwrap();
        assert_eq!(report.chunks_count, 2);
        assert_eq!(report.embeddings_generated, 1);
        assert_eq!(report.embedding_failures[0].order, 1);
        assert_eq!(report.chunks_indexed, 1);

        provider.failing.store(false, Ordering::SeqCst);
        let reindexed = rag.reindex_file("p", "f.txt").await.unwrap();
        assert_eq!(reindexed.chunks_count, 2);
        assert_eq!(reindexed.embeddings_generated, 1);
        assert_eq!(reindexed.vectors_removed, 1);
        assert_eq!(reindexed.vectors_indexed, 2);

        let stats = rag.project_stats("p").await.unwrap();
        assert_eq!(stats.files[0].embedded_chunks, 2);
        assert_eq!(stats.files[0].indexed_vectors, 2);
    }
}
