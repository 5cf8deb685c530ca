//! Application state for the RAG server

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::orchestrator::RagOrchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: RagConfig,
    orchestrator: RagOrchestrator,
}

impl AppState {
    /// Build the orchestrator and its stores from configuration
    pub fn new(config: RagConfig) -> Result<Self> {
        tracing::info!(
            "Initializing RAG application state (data dir: {})...",
            config.storage.data_dir.display()
        );

        let orchestrator = RagOrchestrator::from_config(&config)?;
        if !orchestrator.has_generation() {
            tracing::warn!("No generation backend; chat will return search results only");
        }

        Ok(Self::from_parts(config, orchestrator))
    }

    /// Wrap an already built orchestrator
    pub fn from_parts(config: RagConfig, orchestrator: RagOrchestrator) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
            }),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &RagOrchestrator {
        &self.inner.orchestrator
    }
}
