//! Configuration for the RAG pipeline
//!
//! Loaded from an optional TOML file, then overridden from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::retrieval::SimilarityMetric;

/// Environment variable naming a TOML config file
pub const CONFIG_ENV: &str = "MINI_RAG_CONFIG";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl RagConfig {
    /// Parse a TOML config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::invalid_config(format!("Invalid TOML: {}", e)))
    }

    /// Load from `path`, else `$MINI_RAG_CONFIG`, else defaults; then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var(CONFIG_ENV) {
                Ok(path) if !path.is_empty() => Self::from_file(path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(dir) = lookup("MINI_RAG_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(provider) = lookup("MINI_RAG_LLM_PROVIDER") {
            match provider.to_lowercase().as_str() {
                "none" => self.llm.provider = LlmBackend::None,
                "openai" => self.llm.provider = LlmBackend::OpenAi,
                "ollama" => self.llm.provider = LlmBackend::Ollama,
                other => tracing::warn!("Ignoring unknown MINI_RAG_LLM_PROVIDER '{}'", other),
            }
        }
        if let Some(model) = lookup("MINI_RAG_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(host) = lookup("MINI_RAG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MINI_RAG_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid MINI_RAG_PORT '{}'", port),
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.embeddings.dimensions == 0 {
            return Err(Error::invalid_config("embeddings.dimensions must be > 0"));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::invalid_config("embeddings.batch_size must be > 0"));
        }
        if self.embeddings.workers == Some(0) {
            return Err(Error::invalid_config("embeddings.workers must be > 0"));
        }
        if self.retrieval.top_k == 0 || self.retrieval.context_chunks == 0 {
            return Err(Error::invalid_config(
                "retrieval.top_k and retrieval.context_chunks must be > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(Error::invalid_config(
                "retrieval.similarity_threshold must be within [0, 1]",
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::invalid_config("llm.temperature must be within [0, 2]"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::invalid_config("llm.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Maximum request body in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// On-disk locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mini-rag");
        Self { data_dir }
    }
}

impl StorageConfig {
    /// Source files live at `<files_dir>/<project_id>/<file_id>`
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    /// SQLite database holding chunk text
    pub fn chunk_db_path(&self) -> PathBuf {
        self.data_dir.join("chunks.db")
    }

    /// One collection file per project
    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// How far back from a cut point to look for whitespace (0 = hard cuts)
    pub boundary_window: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            boundary_window: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.chunk_overlap)
    }
}

/// Shared check for chunk size and overlap
pub fn validate_chunking(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::invalid_config("chunk_size must be > 0"));
    }
    if overlap >= chunk_size {
        return Err(Error::invalid_config(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// In-process feature hashing model
    #[default]
    Hashing,
    /// Ollama `/api/embeddings`
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model name (Ollama backend)
    pub model: String,
    /// Vector dimension shared by the embedder and the index
    pub dimensions: usize,
    /// Maximum texts per sub-batch
    pub batch_size: usize,
    /// Embedding worker pool size (default: CPU count, max 4)
    pub workers: Option<usize>,
    /// Ollama base URL
    pub ollama_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            model: "nomic-embed-text".to_string(),
            dimensions: 384,
            batch_size: 32,
            workers: None,
            ollama_url: "http://localhost:11434".to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().clamp(1, 4))
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub metric: SimilarityMetric,
}

/// Retrieval defaults for search and chat
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default results for search
    pub top_k: usize,
    /// Default chunks fed to generation for chat
    pub context_chunks: usize,
    /// Minimum similarity (0.0 disables filtering)
    pub similarity_threshold: f32,
    /// Snippet length for sources
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            context_chunks: 5,
            similarity_threshold: 0.0,
            snippet_chars: 200,
        }
    }
}

/// Generation backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Generation disabled, queries always return ranked chunks
    None,
    /// OpenAI chat completions (needs an API key)
    #[default]
    OpenAi,
    /// Local Ollama server
    Ollama,
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmBackend,
    /// OpenAI key, usually from `OPENAI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub openai_url: String,
    pub ollama_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call timeout in seconds; expiry triggers the search-results fallback
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmBackend::OpenAi,
            api_key: None,
            openai_url: "https://api.openai.com/v1".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3, // Lower for more factual answers
            max_tokens: 1000,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.similarity_threshold, 0.0);
    }

    #[test]
    fn test_partial_toml() {
        let config = RagConfig::from_toml(
            r#"
            [chunking]
            chunk_size = 500
            chunk_overlap = 50

            [llm]
            provider = "none"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.boundary_window, 50);
        assert_eq!(config.llm.provider, LlmBackend::None);
        assert_eq!(config.embeddings.dimensions, 384);
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("MINI_RAG_LLM_PROVIDER", "ollama"),
            ("MINI_RAG_PORT", "9000"),
            ("MINI_RAG_DATA_DIR", "/tmp/mini-rag-test"),
        ]
        .into_iter()
        .collect();

        let mut config = RagConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.provider, LlmBackend::Ollama);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.chunk_db_path(), PathBuf::from("/tmp/mini-rag-test/chunks.db"));
    }

    #[test]
    fn test_bad_port_ignored() {
        let mut config = RagConfig::default();
        config.apply_overrides(|key| (key == "MINI_RAG_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8080);
    }
}
