//! mini-rag: chunk, embed and index project files, then answer questions
//! from them with retrieval-augmented generation.
//!
//! The pipeline is split into independent services wired together by
//! [`RagOrchestrator`]:
//!
//! - [`ingestion::TextChunker`] cuts text into overlapping, word-aligned chunks
//! - [`providers::Embedder`] batches chunks through an embedding model on a bounded pool
//! - [`storage::ChunkStore`] persists chunk text (the source of truth) in SQLite
//! - [`retrieval::VectorIndex`] keeps per-project vectors and answers similarity search
//! - generation goes through an optional [`providers::LlmProvider`]; without one,
//!   queries return ranked chunks instead of failing

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use orchestrator::RagOrchestrator;
pub use types::{
    Chunk, ChatResponse, ProcessOptions, ProcessReport, ProcessRequest, QueryOutcome,
    QueryRequest, RankedChunk,
};
