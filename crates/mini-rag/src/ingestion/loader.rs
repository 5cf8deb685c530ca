//! Source loading: file on disk to raw text plus metadata

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Raw text extracted from a source file
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Turns a file into text
///
/// Fails with `UnreadableSource` for missing, unsupported, undecodable or
/// empty files.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedDocument>;

    /// Whether the loader handles this file's extension
    fn supports(&self, path: &Path) -> bool;
}

/// Supported text formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

impl TextFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" | "text" | "rtf" | "log" => Some(Self::Plain),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TextFormat::Plain => "txt",
            TextFormat::Markdown => "markdown",
        }
    }
}

/// Loader for plain text and markdown files
#[derive(Debug, Clone, Default)]
pub struct TextFileLoader;

impl TextFileLoader {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLoader for TextFileLoader {
    fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let display = path.display().to_string();

        let format = TextFormat::from_path(path)
            .ok_or_else(|| Error::unreadable(&display, "unsupported file type"))?;

        let data = std::fs::read(path).map_err(|e| Error::unreadable(&display, e.to_string()))?;
        let raw = String::from_utf8(data)
            .map_err(|_| Error::unreadable(&display, "file is not valid UTF-8"))?;

        let text = match format {
            TextFormat::Plain => raw.clone(),
            TextFormat::Markdown => markdown_to_text(&raw),
        };

        if text.trim().is_empty() {
            return Err(Error::unreadable(&display, "file has no text content"));
        }

        let mut metadata = HashMap::new();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| display.clone());
        metadata.insert("source".to_string(), name.into());
        metadata.insert("file_type".to_string(), format.as_str().into());
        metadata.insert("size_bytes".to_string(), raw.len().into());
        metadata.insert("content_hash".to_string(), content_hash(&raw).into());

        let shown = &display;
        tracing::debug!("Loaded {} ({} chars)", shown, text.chars().count());

        Ok(LoadedDocument { text, metadata })
    }

    fn supports(&self, path: &Path) -> bool {
        TextFormat::from_path(path).is_some()
    }
}

/// Render markdown to plain text, keeping block structure as line breaks
pub fn markdown_to_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::Start(Tag::Item) => out.push_str("- "),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::CodeBlock) => out.push_str("\n\n"),
            Event::End(TagEnd::Item) | Event::End(TagEnd::TableRow) => out.push('\n'),
            Event::End(TagEnd::TableCell) => out.push('\t'),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

/// SHA-256 of the content, hex encoded
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "Ownership rules.\nBorrowing rules.").unwrap();

        let doc = TextFileLoader::new().load(&path).unwrap();
        assert_eq!(doc.text, "Ownership rules.\nBorrowing rules.");
        assert_eq!(doc.metadata["source"], "notes.txt");
        assert_eq!(doc.metadata["file_type"], "txt");
        assert_eq!(doc.metadata["content_hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_load_markdown_strips_syntax() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guide.md");
        fs::write(&path, "# Title\n\nSome **bold** text and `code`.\n\n* one\n* two\n").unwrap();

        let doc = TextFileLoader::new().load(&path).unwrap();
        assert!(doc.text.starts_with("Title\n\nSome bold text and code."));
        assert!(doc.text.contains("- one"));
        assert!(!doc.text.contains('#'));
        assert!(!doc.text.contains("**"));
    }

    #[test]
    fn test_unreadable_sources() {
        let dir = tempfile::tempdir().unwrap();
        let loader = TextFileLoader::new();

        let missing = dir.path().join("missing.txt");
        assert!(matches!(loader.load(&missing), Err(Error::UnreadableSource { .. })));

        let pdf = dir.path().join("report.pdf");
        fs::write(&pdf, b"%PDF-1.7").unwrap();
        assert!(matches!(loader.load(&pdf), Err(Error::UnreadableSource { .. })));

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "  \n ").unwrap();
        assert!(matches!(loader.load(&empty), Err(Error::UnreadableSource { .. })));

        let binary = dir.path().join("blob.txt");
        fs::write(&binary, [0xff, 0xfe, 0x00, 0x9f]).unwrap();
        assert!(matches!(loader.load(&binary), Err(Error::UnreadableSource { .. })));
    }

    #[test]
    fn test_supports() {
        let loader = TextFileLoader::new();
        assert!(loader.supports(Path::new("a.MD")));
        assert!(loader.supports(Path::new("a.txt")));
        assert!(!loader.supports(Path::new("a.docx")));
        assert!(!loader.supports(Path::new("noext")));
    }
}
