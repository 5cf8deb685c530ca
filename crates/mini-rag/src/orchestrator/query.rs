//! Query handling: retrieve, then generate or fall back to ranked chunks

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::types::{FallbackReason, QueryOutcome, QueryRequest, RankedChunk, Source};

use super::{validate_id, RagOrchestrator};

const NO_RELEVANT_CONTENT: &str = "no relevant content found";

impl RagOrchestrator {
    /// Answer a question from a project's documents
    ///
    /// Only a failure to embed the query is an error; every generation
    /// failure degrades to `FallbackResults`.
    pub async fn query(&self, project_id: &str, request: &QueryRequest) -> Result<QueryOutcome> {
        let top_k = request.top_k.unwrap_or(self.retrieval.context_chunks);
        let ranked = dedupe_by_text(self.retrieve(project_id, request, top_k).await?);

        if ranked.is_empty() {
            return Ok(QueryOutcome::Empty {
                reason: NO_RELEVANT_CONTENT.to_string(),
            });
        }

        let llm = match &self.llm {
            Some(llm) => llm,
            None => {
                return Ok(QueryOutcome::FallbackResults {
                    ranked_chunks: ranked,
                    reason: FallbackReason::GenerationUnavailable,
                    detail: None,
                })
            }
        };

        let context = PromptBuilder::build_context(&ranked);
        let prompt = PromptBuilder::build_rag_prompt(&request.query, &context);
        tracing::debug!(
            "Prompt for {} has {} context chunks (~{} tokens)",
            project_id,
            ranked.len(),
            PromptBuilder::estimate_tokens(&prompt)
        );

        let generated =
            tokio::time::timeout(self.generation_timeout, llm.generate(&prompt, &self.generation))
                .await;

        let (reason, detail) = match generated {
            Ok(Ok(answer)) if !answer.trim().is_empty() => {
                let sources = ranked
                    .iter()
                    .enumerate()
                    .map(|(i, chunk)| Source::from_ranked(i + 1, chunk, self.retrieval.snippet_chars))
                    .collect();
                return Ok(QueryOutcome::Answered {
                    answer: answer.trim().to_string(),
                    sources,
                });
            }
            Ok(Ok(_)) => (
                FallbackReason::GenerationError,
                "generation returned an empty answer".to_string(),
            ),
            Ok(Err(e @ Error::GenerationUnavailable(_))) => {
                (FallbackReason::GenerationUnavailable, e.to_string())
            }
            Ok(Err(e)) => (FallbackReason::GenerationError, e.to_string()),
            Err(_) => (
                FallbackReason::GenerationTimeout,
                format!("no answer within {:?}", self.generation_timeout),
            ),
        };

        tracing::warn!(
            "Falling back to search results for {} ({}): {}",
            project_id,
            llm.name(),
            detail
        );
        Ok(QueryOutcome::FallbackResults {
            ranked_chunks: ranked,
            reason,
            detail: Some(detail),
        })
    }

    /// Ranked chunks for a query, without generation
    pub async fn search(&self, project_id: &str, request: &QueryRequest) -> Result<Vec<RankedChunk>> {
        let top_k = request.top_k.unwrap_or(self.retrieval.top_k);
        self.retrieve(project_id, request, top_k).await
    }

    async fn retrieve(
        &self,
        project_id: &str,
        request: &QueryRequest,
        top_k: usize,
    ) -> Result<Vec<RankedChunk>> {
        validate_id("project_id", project_id)?;
        if let Some(file_id) = &request.file_id {
            validate_id("file_id", file_id)?;
        }
        if request.query.trim().is_empty() {
            return Err(Error::invalid_input("query must not be empty"));
        }
        if top_k == 0 {
            return Err(Error::invalid_config("top_k must be > 0"));
        }
        let threshold = request
            .similarity_threshold
            .unwrap_or(self.retrieval.similarity_threshold);
        if !threshold.is_finite() {
            return Err(Error::invalid_config("similarity_threshold must be a finite number"));
        }

        let query_vector = self
            .embedder
            .embed_one(&request.query)
            .await
            .map_err(|e| Error::RetrievalUnavailable(e.to_string()))?;

        let mut hits = self
            .vector_store
            .search(project_id, &query_vector, top_k, request.file_id.as_deref())
            .await?;
        let candidates = hits.len();
        if threshold > 0.0 {
            hits.retain(|h| h.similarity >= threshold);
        }
        tracing::debug!(
            "{} of {} candidates in {} cleared threshold {}",
            hits.len(),
            candidates,
            project_id,
            threshold
        );
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = hits.iter().map(|h| h.chunk_id).collect();
        let project = project_id.to_string();
        let mut texts = self
            .with_store(move |store| store.get_by_ids(&project, &ids))
            .await?;

        // A hit without stored text belongs to a file being replaced; skip it
        let ranked = hits
            .into_iter()
            .filter_map(|hit| {
                texts.remove(&hit.chunk_id).map(|chunk| RankedChunk {
                    chunk_id: hit.chunk_id,
                    file_id: hit.file_id,
                    order: hit.order,
                    similarity: hit.similarity,
                    text: chunk.text,
                })
            })
            .collect();

        Ok(ranked)
    }
}

/// Keep the first (highest ranked) chunk for each distinct text
fn dedupe_by_text(ranked: Vec<RankedChunk>) -> Vec<RankedChunk> {
    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|c| seen.insert(c.text.trim().to_string()))
        .collect()
}
