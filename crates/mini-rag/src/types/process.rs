//! File processing request and report types

use serde::{Deserialize, Deserializer, Serialize};

/// Stages of a file-processing run
///
/// A failed run is reported as `Error::ProcessingFailed` carrying the stage
/// it had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Chunked,
    Embedding,
    Persisted,
    /// Embedded chunks are indexed; some chunks still await embedding
    Indexed,
    Done,
}

/// Knobs for one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub do_reset: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap_size(),
            do_reset: false,
        }
    }
}

/// Process request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// File to process, resolved under the project's files directory
    pub file_id: String,

    /// Chunk size in characters (default: 1000)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks (default: 200)
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,

    /// Delete the file's previous chunks and vectors first. Accepts 0/1 or a boolean.
    #[serde(default, deserialize_with = "bool_or_int")]
    pub do_reset: bool,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_overlap_size() -> usize {
    200
}

fn bool_or_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

impl ProcessRequest {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            chunk_size: default_chunk_size(),
            overlap_size: default_overlap_size(),
            do_reset: false,
        }
    }

    pub fn with_reset(mut self, do_reset: bool) -> Self {
        self.do_reset = do_reset;
        self
    }

    pub fn options(&self) -> ProcessOptions {
        ProcessOptions {
            chunk_size: self.chunk_size,
            overlap: self.overlap_size,
            do_reset: self.do_reset,
        }
    }
}

/// A chunk that could not be embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingFailure {
    pub order: u32,
    pub reason: String,
}

/// Chunks and vectors removed by a reset or deletion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub chunks_deleted: usize,
    pub vectors_deleted: usize,
}

/// Outcome of processing one file
///
/// Partial embedding or indexing failure still produces a report; the
/// counts say how far the run got.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub project_id: String,
    pub file_id: String,
    /// Last stage reached: `Done`, `Indexed` when some chunks were not
    /// embedded, or `Persisted` when indexing failed
    pub stage: ProcessingStage,
    pub chunks_count: usize,
    pub chunks_saved: usize,
    pub embeddings_generated: usize,
    pub chunks_indexed: usize,
    /// Whether the vector index accepted the embedded subset
    pub indexed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<DeletionSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding_failures: Vec<EmbeddingFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
    pub processing_time_ms: u64,
}

impl ProcessReport {
    /// Report for text that produced no chunks
    pub fn empty(project_id: &str, file_id: &str, reset: Option<DeletionSummary>) -> Self {
        Self {
            project_id: project_id.to_string(),
            file_id: file_id.to_string(),
            stage: ProcessingStage::Done,
            chunks_count: 0,
            chunks_saved: 0,
            embeddings_generated: 0,
            chunks_indexed: 0,
            indexed: true,
            reset,
            embedding_failures: Vec::new(),
            index_error: None,
            processing_time_ms: 0,
        }
    }

    /// True when some chunks were not embedded or not indexed
    pub fn is_degraded(&self) -> bool {
        self.embeddings_generated < self.chunks_count || !self.indexed
    }

    /// Short status string for API responses
    pub fn signal(&self) -> &'static str {
        if self.chunks_count == 0 {
            "process_no_content"
        } else if self.is_degraded() {
            "process_partial"
        } else {
            "process_success"
        }
    }
}

/// Outcome of rebuilding one file's vectors from stored chunks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexReport {
    pub project_id: String,
    pub file_id: String,
    pub chunks_count: usize,
    /// Chunks that had no embedding and were embedded by this run
    pub embeddings_generated: usize,
    pub vectors_indexed: usize,
    pub vectors_removed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding_failures: Vec<EmbeddingFailure>,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_request_defaults() {
        let request: ProcessRequest = serde_json::from_str(r#"{"file_id": "notes.txt"}"#).unwrap();
        assert_eq!(request.chunk_size, 1000);
        assert_eq!(request.overlap_size, 200);
        assert!(!request.do_reset);
    }

    #[test]
    fn test_do_reset_accepts_int_and_bool() {
        let request: ProcessRequest =
            serde_json::from_str(r#"{"file_id": "a", "do_reset": 1}"#).unwrap();
        assert!(request.do_reset);

        let request: ProcessRequest =
            serde_json::from_str(r#"{"file_id": "a", "do_reset": false}"#).unwrap();
        assert!(!request.do_reset);
    }

    #[test]
    fn test_report_signal() {
        let mut report = ProcessReport::empty("p", "f", None);
        assert_eq!(report.signal(), "process_no_content");

        report.chunks_count = 5;
        report.chunks_saved = 5;
        report.embeddings_generated = 3;
        assert!(report.is_degraded());
        assert_eq!(report.signal(), "process_partial");

        report.embeddings_generated = 5;
        assert_eq!(report.signal(), "process_success");
    }
}
