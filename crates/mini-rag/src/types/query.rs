//! Query request types

use serde::{Deserialize, Serialize};

/// Query against one project's collection
///
/// Unset fields fall back to the orchestrator's retrieval configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question or search text
    pub query: String,

    /// Number of chunks to retrieve
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Restrict retrieval to one file
    #[serde(default)]
    pub file_id: Option<String>,

    /// Minimum similarity (0.0 disables filtering)
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

impl QueryRequest {
    /// Create a new query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Set the number of results to retrieve
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Filter by file
    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Set the similarity threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_body() {
        let request: QueryRequest = serde_json::from_str(r#"{"query": "what is rust?"}"#).unwrap();
        assert_eq!(request.query, "what is rust?");
        assert!(request.top_k.is_none());
        assert!(request.file_id.is_none());
    }

    #[test]
    fn test_builder() {
        let request = QueryRequest::new("q").with_top_k(3).with_file("a.txt").with_threshold(0.4);
        assert_eq!(request.top_k, Some(3));
        assert_eq!(request.file_id.as_deref(), Some("a.txt"));
        assert_eq!(request.similarity_threshold, Some(0.4));
    }
}
