//! Storage module for persistent chunk data
//!
//! Provides SQLite-based persistence for chunk text, metadata and embeddings.

mod chunk_store;

pub use chunk_store::{ChunkStore, FileChunkCounts};
