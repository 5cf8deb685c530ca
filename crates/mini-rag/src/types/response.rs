//! Response types for queries and project statistics

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk_id: Uuid,
    pub file_id: String,
    pub order: u32,
    /// Similarity score (higher is more similar)
    pub similarity: f32,
    pub text: String,
}

/// Citation attached to a generated answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// 1-based position, matching `[Context i]` in the prompt
    pub source_index: usize,
    pub chunk_id: Uuid,
    pub file_id: String,
    pub chunk_order: u32,
    pub similarity: f32,
    /// Leading text of the chunk, truncated with "..."
    pub snippet: String,
}

impl Source {
    /// Build a citation for the `index`-th (1-based) retrieved chunk
    pub fn from_ranked(index: usize, chunk: &RankedChunk, snippet_chars: usize) -> Self {
        Self {
            source_index: index,
            chunk_id: chunk.chunk_id,
            file_id: chunk.file_id.clone(),
            chunk_order: chunk.order,
            similarity: chunk.similarity,
            snippet: truncate_snippet(&chunk.text, snippet_chars),
        }
    }
}

/// Cut `text` to at most `max_chars` characters, appending "..." when cut
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Why a query returned ranked chunks instead of an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No generation backend configured
    GenerationUnavailable,
    /// Generation backend returned an error
    GenerationError,
    /// Generation did not finish within the configured timeout
    GenerationTimeout,
}

impl FallbackReason {
    pub fn warning(&self) -> &'static str {
        match self {
            FallbackReason::GenerationUnavailable => {
                "Generation is not configured; returning search results only"
            }
            FallbackReason::GenerationError => {
                "Answer generation failed; returning search results only"
            }
            FallbackReason::GenerationTimeout => {
                "Answer generation timed out; returning search results only"
            }
        }
    }
}

/// Result of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Generated answer with citations
    Answered {
        answer: String,
        sources: Vec<Source>,
    },
    /// Ranked chunks returned in place of an answer
    FallbackResults {
        ranked_chunks: Vec<RankedChunk>,
        reason: FallbackReason,
        /// Underlying error text, if any
        detail: Option<String>,
    },
    /// Nothing cleared the similarity threshold
    Empty { reason: String },
}

impl QueryOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutcome::Answered { .. } => "answered",
            QueryOutcome::FallbackResults { .. } => "fallback_results",
            QueryOutcome::Empty { .. } => "empty",
        }
    }
}

/// Chat endpoint body
///
/// `answer` is null for fallback and empty outcomes; `search_results` carries
/// the ranked chunks on fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub query: String,
    pub kind: String,
    pub answer: Option<String>,
    pub sources: Vec<Source>,
    pub search_results: Vec<RankedChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub chunks_retrieved: usize,
    pub processing_time_ms: u64,
}

impl ChatResponse {
    pub fn from_outcome(query: &str, outcome: QueryOutcome, processing_time_ms: u64) -> Self {
        let kind = outcome.kind().to_string();
        match outcome {
            QueryOutcome::Answered { answer, sources } => Self {
                query: query.to_string(),
                kind,
                answer: Some(answer),
                chunks_retrieved: sources.len(),
                sources,
                search_results: Vec::new(),
                warning: None,
                error: None,
                processing_time_ms,
            },
            QueryOutcome::FallbackResults {
                ranked_chunks,
                reason,
                detail,
            } => Self {
                query: query.to_string(),
                kind,
                answer: None,
                sources: Vec::new(),
                chunks_retrieved: ranked_chunks.len(),
                search_results: ranked_chunks,
                warning: Some(reason.warning().to_string()),
                error: detail,
                processing_time_ms,
            },
            QueryOutcome::Empty { reason } => Self {
                query: query.to_string(),
                kind,
                answer: None,
                sources: Vec::new(),
                search_results: Vec::new(),
                warning: Some(reason),
                error: None,
                chunks_retrieved: 0,
                processing_time_ms,
            },
        }
    }
}

/// Search endpoint body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RankedChunk>,
    pub total: usize,
    pub processing_time_ms: u64,
}

/// Per-file counts within a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub file_id: String,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub indexed_vectors: usize,
}

/// Project-level counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub project_id: String,
    pub total_chunks: usize,
    pub indexed_vectors: usize,
    pub unique_files: usize,
    pub files: Vec<FileStats>,
}
