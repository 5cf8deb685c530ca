//! Document ingestion: loading source files and chunking their text

mod chunker;
mod loader;

pub use chunker::{expected_chunk_count, ChunkSpan, TextChunker};
pub use loader::{content_hash, markdown_to_text, DocumentLoader, LoadedDocument, TextFileLoader, TextFormat};
