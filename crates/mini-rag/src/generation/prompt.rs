//! Prompt templates for RAG generation

use crate::types::RankedChunk;

/// System message for chat-style backends
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions \
using only the provided document context. If the context does not contain the answer, say so.";

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build numbered context blocks from ranked chunks
    pub fn build_context(chunks: &[RankedChunk]) -> String {
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                format!(
                    "[Context {}]\n{}\nSource: {}, chunk {} (similarity: {:.2})",
                    i + 1,
                    chunk.text.trim(),
                    chunk.file_id,
                    chunk.order,
                    chunk.similarity
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the full RAG prompt with grounding instructions
    pub fn build_rag_prompt(question: &str, context: &str) -> String {
        format!(
            r#"Answer the question using ONLY the context below.

Instructions:
1. Use only information stated in the context
2. If the context does not contain the answer, reply "I could not find this in the provided documents."
3. Refer to supporting passages by their number, for example [Context 2]
4. Be concise and factual

CONTEXT:
{context}

QUESTION: {question}

ANSWER:"#,
            context = context,
            question = question.trim()
        )
    }

    /// Rough token estimate (~4 characters per token)
    pub fn estimate_tokens(text: &str) -> usize {
        text.len() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ranked(file_id: &str, order: u32, similarity: f32, text: &str) -> RankedChunk {
        RankedChunk {
            chunk_id: Uuid::new_v4(),
            file_id: file_id.to_string(),
            order,
            similarity,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_context_blocks_are_numbered() {
        let context = PromptBuilder::build_context(&[
            ranked("guide.md", 3, 0.912, "Ownership moves values."),
            ranked("faq.txt", 0, 0.5, "Borrowing lends them."),
        ]);

        assert!(context.starts_with("[Context 1]\nOwnership moves values."));
        assert!(context.contains("Source: guide.md, chunk 3 (similarity: 0.91)"));
        assert!(context.contains("[Context 2]\nBorrowing lends them.\nSource: faq.txt, chunk 0"));
    }

    #[test]
    fn test_prompt_contains_question_and_context() {
        let prompt = PromptBuilder::build_rag_prompt("  What moves?  ", "[Context 1]\nvalues");
        assert!(prompt.contains("QUESTION: What moves?\n"));
        assert!(prompt.contains("CONTEXT:\n[Context 1]\nvalues"));
        assert!(prompt.trim_end().ends_with("ANSWER:"));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(PromptBuilder::estimate_tokens(""), 0);
        assert_eq!(PromptBuilder::estimate_tokens("abcdefgh"), 2);
    }
}
