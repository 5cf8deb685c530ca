//! Core types for the RAG pipeline

pub mod chunk;
pub mod process;
pub mod query;
pub mod response;

pub use chunk::{Chunk, SourceInfo, VectorRecord};
pub use process::{
    DeletionSummary, EmbeddingFailure, ProcessOptions, ProcessReport, ProcessRequest, ProcessingStage,
    ReindexReport,
};
pub use query::QueryRequest;
pub use response::{
    ChatResponse, FallbackReason, FileStats, ProjectStats, QueryOutcome, RankedChunk,
    SearchResponse, Source,
};
