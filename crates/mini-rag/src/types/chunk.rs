//! Chunk and vector record types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Where a piece of text came from: the project/file pair plus loader metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    pub project_id: String,
    pub file_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SourceInfo {
    pub fn new(project_id: impl Into<String>, file_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            file_id: file_id.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach loader metadata
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A contiguous, ordered segment of a source document
///
/// Chunks are never mutated after creation. Attaching an embedding consumes
/// the chunk and returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Owning project
    pub project_id: String,
    /// Owning file within the project
    pub file_id: String,
    /// Position within the file, 0..N-1
    pub order: u32,
    /// Chunk text, never empty
    pub text: String,
    /// Embedding vector, absent until embedded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Source metadata plus character offsets
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Create an unembedded chunk covering `[char_start, char_end)` of its source
    pub fn new(
        source: &SourceInfo,
        order: u32,
        text: String,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        let mut metadata = source.metadata.clone();
        metadata.insert("char_start".to_string(), char_start.into());
        metadata.insert("char_end".to_string(), char_end.into());

        Self {
            id: Uuid::new_v4(),
            project_id: source.project_id.clone(),
            file_id: source.file_id.clone(),
            order,
            text,
            embedding: None,
            metadata,
        }
    }

    /// Return this chunk with an embedding attached
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// Character offsets recorded at chunking time
    pub fn char_range(&self) -> Option<(usize, usize)> {
        let start = self.metadata.get("char_start")?.as_u64()?;
        let end = self.metadata.get("char_end")?.as_u64()?;
        Some((start as usize, end as usize))
    }

    /// Project this chunk into the vector index's record shape
    pub fn to_vector_record(&self) -> Option<VectorRecord> {
        self.embedding.as_ref().map(|vector| VectorRecord {
            id: self.id,
            vector: vector.clone(),
            project_id: self.project_id.clone(),
            file_id: self.file_id.clone(),
            order: self.order,
        })
    }
}

/// The vector index's stored unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Same as the chunk ID
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub project_id: String,
    pub file_id: String,
    pub order: u32,
}
