//! Provider abstractions for embeddings, LLM and vector storage
//!
//! Trait-based so the orchestrator can switch between in-process and
//! remote backends from configuration alone.

pub mod embedding;
pub mod hashing;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod retry;
pub mod vector_store;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingConfig, LlmBackend, LlmConfig};
use crate::error::Result;

pub use embedding::{BatchEmbedding, Embedder, EmbeddingProvider};
pub use hashing::HashEmbedder;
pub use llm::{GenerationConfig, LlmProvider};
pub use local::LocalVectorStore;
pub use ollama::{OllamaEmbedder, OllamaLlm};
pub use openai::OpenAiLlm;
pub use vector_store::VectorStoreProvider;

/// Build the configured embedding backend
pub fn build_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.backend {
        EmbeddingBackend::Hashing => Arc::new(HashEmbedder::new(config.dimensions)),
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(config)?),
    };
    tracing::info!(
        "Embedding provider: {} ({} dimensions)",
        provider.name(),
        provider.dimensions()
    );
    Ok(provider)
}

/// Build the configured LLM, or `None` when generation is unavailable
///
/// A missing OpenAI key is not fatal: queries degrade to ranked results.
pub fn build_llm_provider(config: &LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    let built: Result<Arc<dyn LlmProvider>> = match config.provider {
        LlmBackend::None => return None,
        LlmBackend::OpenAi => OpenAiLlm::new(config).map(|l| Arc::new(l) as Arc<dyn LlmProvider>),
        LlmBackend::Ollama => OllamaLlm::new(config).map(|l| Arc::new(l) as Arc<dyn LlmProvider>),
    };

    match built {
        Ok(llm) => {
            tracing::info!("LLM provider: {} ({})", llm.name(), llm.model());
            Some(llm)
        }
        Err(e) => {
            tracing::warn!("Generation disabled: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_embedding_backend_is_local() {
        let provider = build_embedding_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.name(), "feature-hash");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn test_llm_disabled_without_key() {
        assert!(build_llm_provider(&LlmConfig::default()).is_none());

        let none = LlmConfig {
            provider: LlmBackend::None,
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        assert!(build_llm_provider(&none).is_none());
    }
}
