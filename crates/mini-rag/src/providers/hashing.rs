//! Deterministic feature-hashing embedder
//!
//! Hashes words, word bigrams and character trigrams into a fixed number of
//! signed buckets, then L2-normalizes. Text without any words is tokenized on
//! whitespace instead. No model download or network access;
//! identical text always yields identical vectors.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;

const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.25;

/// Feature-hashing embedding model
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Embed on the current thread
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(Error::invalid_config("embedding dimensions must be > 0"));
        }

        let lower = text.to_lowercase();
        let mut words: Vec<&str> = lower.unicode_words().collect();
        if words.is_empty() {
            // Symbol-only text (rules, tables, emoji) still gets features
            words = lower.split_whitespace().collect();
        }
        if words.is_empty() {
            return Err(Error::invalid_input("cannot embed blank text"));
        }

        let mut vector = vec![0.0f32; self.dimensions];

        for word in &words {
            self.add_feature(&mut vector, word.as_bytes(), WORD_WEIGHT);

            let padded: Vec<char> = format!("<{}>", word).chars().collect();
            for tri in padded.windows(3) {
                let tri: String = tri.iter().collect();
                self.add_feature(&mut vector, tri.as_bytes(), TRIGRAM_WEIGHT);
            }
        }

        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        let magnitude = vector
            .iter()
            .map(|v| (*v as f64) * (*v as f64))
            .sum::<f64>()
            .sqrt();
        if magnitude == 0.0 {
            return Err(Error::embedding("text hashed to a zero vector"));
        }
        for v in &mut vector {
            *v = (*v as f64 / magnitude) as f32;
        }

        Ok(vector)
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let bucket = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[(bucket % self.dimensions as u64) as usize] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = *self;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embedder.embed_sync(&text)).await?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = *self;
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts.iter().map(|t| embedder.embed_sync(t)).collect()
        })
        .await?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "feature-hash"
    }
}
