//! Character-based text chunking with overlap
//!
//! Chunk `i` nominally covers `[i * (size - overlap), i * (size - overlap) + size)`
//! in characters. When whitespace lies within `boundary_window` characters of a
//! cut, the cut moves there so words stay whole. Snapping is best-effort: a
//! long run without whitespace is cut hard.

use std::iter;

use crate::config::{validate_chunking, ChunkingConfig};
use crate::error::Result;
use crate::types::{Chunk, SourceInfo};

/// Character range `[start, end)` of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
}

impl ChunkSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Deterministic text chunker
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Lookback (and look-ahead for chunk starts) when searching for whitespace
    boundary_window: usize,
}

impl TextChunker {
    /// Create a chunker; a window of 0 disables word-boundary snapping
    pub fn new(boundary_window: usize) -> Self {
        Self { boundary_window }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.boundary_window)
    }

    /// Split `text` into chunks tagged with `source`, ordered 0..N-1
    ///
    /// Empty or whitespace-only text yields no chunks, and spans that fall
    /// entirely inside a whitespace run are dropped.
    pub fn split(
        &self,
        text: &str,
        chunk_size: usize,
        overlap: usize,
        source: &SourceInfo,
    ) -> Result<Vec<Chunk>> {
        let spans = self.spans(text, chunk_size, overlap)?;
        if spans.is_empty() {
            return Ok(Vec::new());
        }

        // char index -> byte offset, with one extra entry for the end of text
        let byte_at: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(iter::once(text.len()))
            .collect();

        let chunks = spans
            .iter()
            .enumerate()
            .map(|(order, span)| {
                let piece = &text[byte_at[span.start]..byte_at[span.end]];
                Chunk::new(source, order as u32, piece.to_string(), span.start, span.end)
            })
            .collect();

        Ok(chunks)
    }

    /// Compute chunk character spans without materializing chunks
    pub fn spans(&self, text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<ChunkSpan>> {
        validate_chunking(chunk_size, overlap)?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut spans = Vec::with_capacity(expected_chunk_count(len, chunk_size, overlap));
        let mut start = 0usize;

        loop {
            let target_end = (start + chunk_size).min(len);
            let end = if target_end < len {
                self.snap_end(&chars, start, target_end, overlap)
            } else {
                target_end
            };

            spans.push(ChunkSpan { start, end });

            if end >= len {
                break;
            }

            // end > start + overlap, so the next chunk always advances
            start = self.snap_start(&chars, end - overlap, end);
        }

        // A long whitespace run (typically trailing newlines) can fill a whole span
        spans.retain(|span| !chars[span.start..span.end].iter().all(|c| c.is_whitespace()));

        Ok(spans)
    }

    /// Move a cut back to the nearest word boundary within the window.
    /// Never goes at or below `start + overlap`.
    fn snap_end(&self, chars: &[char], start: usize, target_end: usize, overlap: usize) -> usize {
        if self.boundary_window == 0 || is_boundary(chars, target_end) {
            return target_end;
        }

        let floor = (start + overlap + 1).max(target_end.saturating_sub(self.boundary_window));
        let mut pos = target_end;
        while pos > floor {
            pos -= 1;
            if is_boundary(chars, pos) {
                return pos;
            }
        }

        target_end
    }

    /// Move a chunk start forward to a word boundary, staying within the
    /// previous chunk.
    fn snap_start(&self, chars: &[char], nominal: usize, prev_end: usize) -> usize {
        if self.boundary_window == 0 || nominal == prev_end || is_boundary(chars, nominal) {
            return nominal;
        }

        let limit = (nominal + self.boundary_window).min(prev_end);
        (nominal + 1..=limit)
            .find(|&pos| is_boundary(chars, pos))
            .unwrap_or(nominal)
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// A position is a boundary when either neighbour is whitespace
fn is_boundary(chars: &[char], pos: usize) -> bool {
    if pos == 0 || pos >= chars.len() {
        return true;
    }
    chars[pos - 1].is_whitespace() || chars[pos].is_whitespace()
}

/// Chunk count for `len` characters with hard cuts:
/// `ceil((len - overlap) / (chunk_size - overlap))`, at least 1 for non-empty text
pub fn expected_chunk_count(len: usize, chunk_size: usize, overlap: usize) -> usize {
    if len == 0 || chunk_size <= overlap {
        return 0;
    }
    let step = chunk_size - overlap;
    len.saturating_sub(overlap).div_ceil(step).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn source() -> SourceInfo {
        SourceInfo::new("proj", "doc.txt")
    }

    /// Deterministic pseudo-random prose with mixed word lengths and some unicode
    fn prose(words: usize, seed: u64) -> String {
        const VOCAB: &[&str] = &[
            "the", "ownership", "borrow", "checker", "über", "naïve", "lifetimes", "a",
            "trait", "résumé", "東京", "vector", "index", "chunk", "embedding", "query",
        ];
        let mut state = seed;
        let mut out = String::new();
        for i in 0..words {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let word = VOCAB[(state >> 33) as usize % VOCAB.len()];
            if i > 0 {
                out.push(if (state >> 20) % 11 == 0 { '\n' } else { ' ' });
            }
            out.push_str(word);
        }
        out
    }

    /// Rebuild text from each chunk's leading segment (the part before the
    /// next chunk starts)
    fn reassemble(text: &str, spans: &[ChunkSpan]) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        for (i, span) in spans.iter().enumerate() {
            let lead_end = spans.get(i + 1).map(|next| next.start).unwrap_or(span.end);
            out.extend(&chars[span.start..lead_end]);
        }
        out
    }

    #[test]
    fn test_2500_chars_three_chunks() {
        let text = "a".repeat(2500);
        let chunker = TextChunker::default();

        let spans = chunker.spans(&text, 1000, 200).unwrap();
        assert_eq!(
            spans,
            vec![
                ChunkSpan { start: 0, end: 1000 },
                ChunkSpan { start: 800, end: 1800 },
                ChunkSpan { start: 1600, end: 2500 },
            ]
        );

        let chunks = chunker.split(&text, 1000, 200, &source()).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text.chars().count(), 900);
        assert_eq!(chunks[1].char_range(), Some((800, 1800)));
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        let chunker = TextChunker::default();
        assert!(chunker.split("", 1000, 200, &source()).unwrap().is_empty());
        assert!(chunker.split("   \n\t  ", 1000, 200, &source()).unwrap().is_empty());
    }

    #[test]
    fn test_trailing_newlines_do_not_make_a_chunk() {
        let text = format!("Ownership is a set of rules.{}", "\n".repeat(1200));
        let chunker = TextChunker::default();

        let spans = chunker.spans(&text, 1000, 200).unwrap();
        assert_eq!(spans.len(), 1);

        let chunks = chunker.split(&text, 1000, 200, &source()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].order, 0);
        assert!(chunks[0].text.starts_with("Ownership"));
    }

    #[test]
    fn test_blank_run_inside_text_is_skipped() {
        let text = format!("first part{}second part", " ".repeat(500));
        let chunks = TextChunker::new(0).split(&text, 100, 10, &source()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
        assert_eq!(chunks[1].order, 1);
        assert!(chunks[1].text.ends_with("second part"));
    }

    #[test]
    fn test_invalid_configuration() {
        let chunker = TextChunker::default();
        assert!(matches!(
            chunker.split("text", 0, 0, &source()),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            chunker.split("text", 100, 100, &source()),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            chunker.split("text", 100, 150, &source()),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_orders_are_sequential() {
        let text = prose(600, 7);
        let chunks = TextChunker::default().split(&text, 300, 50, &source()).unwrap();
        assert!(chunks.len() > 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.order, i as u32);
            assert!(!chunk.text.is_empty());
            assert_eq!(chunk.project_id, "proj");
            assert_eq!(chunk.file_id, "doc.txt");
            assert!(chunk.embedding.is_none());
        }
    }

    #[test]
    fn test_reassembly_reconstructs_text() {
        let params = [(1000, 200), (300, 0), (120, 119), (64, 16), (7, 3), (2, 1)];
        for (seed, &(size, overlap)) in params.iter().enumerate() {
            let text = prose(400, seed as u64 + 1);
            for window in [0, 50] {
                let spans = TextChunker::new(window).spans(&text, size, overlap).unwrap();
                assert_eq!(
                    reassemble(&text, &spans),
                    text,
                    "size={} overlap={} window={}",
                    size,
                    overlap,
                    window
                );
            }
        }
    }

    #[test]
    fn test_hard_cut_count_matches_formula() {
        for (seed, &(size, overlap)) in [(1000, 200), (100, 10), (33, 32), (50, 0)]
            .iter()
            .enumerate()
        {
            let text = prose(300, seed as u64 + 11);
            let len = text.chars().count();
            let spans = TextChunker::new(0).spans(&text, size, overlap).unwrap();
            assert_eq!(spans.len(), expected_chunk_count(len, size, overlap));
            assert!(spans.iter().all(|s| !s.is_empty()));
        }
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let spans = TextChunker::default().spans("hello world", 1000, 200).unwrap();
        assert_eq!(spans, vec![ChunkSpan { start: 0, end: 11 }]);
    }

    #[test]
    fn test_cuts_land_on_word_boundaries() {
        let text = prose(800, 3);
        let chars: Vec<char> = text.chars().collect();
        let spans = TextChunker::new(50).spans(&text, 200, 40).unwrap();

        for (i, span) in spans.iter().enumerate() {
            assert!(is_boundary(&chars, span.start), "chunk {} starts mid-word", i);
            assert!(is_boundary(&chars, span.end), "chunk {} ends mid-word", i);
            assert!(span.len() <= 200);
        }
    }

    #[test]
    fn test_no_whitespace_falls_back_to_hard_cut() {
        let text = "x".repeat(450);
        let spans = TextChunker::new(50).spans(&text, 200, 0).unwrap();
        assert_eq!(
            spans,
            vec![
                ChunkSpan { start: 0, end: 200 },
                ChunkSpan { start: 200, end: 400 },
                ChunkSpan { start: 400, end: 450 },
            ]
        );
    }

    #[test]
    fn test_source_metadata_is_copied() {
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("source".to_string(), serde_json::json!("notes.md"));
        let source = source().with_metadata(metadata);

        let chunks = TextChunker::default().split("some text here", 100, 10, &source).unwrap();
        assert_eq!(chunks[0].metadata["source"], "notes.md");
        assert_eq!(chunks[0].char_range(), Some((0, 14)));
    }

    #[test]
    fn test_expected_chunk_count() {
        assert_eq!(expected_chunk_count(2500, 1000, 200), 3);
        assert_eq!(expected_chunk_count(1000, 1000, 200), 1);
        assert_eq!(expected_chunk_count(100, 1000, 200), 1);
        assert_eq!(expected_chunk_count(0, 1000, 200), 0);
    }
}
