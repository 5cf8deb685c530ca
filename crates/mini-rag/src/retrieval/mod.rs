//! Vector retrieval: per-project similarity index and its persistence

mod index;
mod persist;

pub use index::{SearchHit, SimilarityMetric, VectorIndex};
