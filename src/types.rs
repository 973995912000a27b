//! Core document types for the retrieval pipeline

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity key for deduplication across retrieval signals.
///
/// Derived from `(source, page)`: two documents with the same source and
/// page are the same logical unit even if their content differs; documents
/// from different sources or pages are distinct even with identical content.
pub type DocKey = (String, Option<u32>);

/// Metadata attached to a retrievable document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// Source identifier (file path, URL, document name)
    pub source: String,
    /// Page number for paginated sources (PDFs)
    #[serde(default)]
    pub page: Option<u32>,
    /// Additional loader-supplied metadata
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl DocMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page: None,
            extra: HashMap::new(),
        }
    }
}

/// An immutable unit of retrievable text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: DocMetadata::new(source),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.metadata.page = Some(page);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    /// Identity key used when merging ranked lists from multiple signals
    pub fn key(&self) -> DocKey {
        (self.metadata.source.clone(), self.metadata.page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_new() {
        let doc = Document::new("Early repayment is free of charge.", "loans.pdf");
        assert_eq!(doc.content, "Early repayment is free of charge.");
        assert_eq!(doc.metadata.source, "loans.pdf");
        assert!(doc.metadata.page.is_none());
        assert!(doc.metadata.extra.is_empty());
    }

    #[test]
    fn test_document_builder_chaining() {
        let doc = Document::new("content", "deposits.pdf")
            .with_page(3)
            .with_extra("lang", "en");
        assert_eq!(doc.metadata.page, Some(3));
        assert_eq!(doc.metadata.extra.get("lang").map(String::as_str), Some("en"));
    }

    #[test]
    fn test_key_distinguishes_pages_of_same_source() {
        let p1 = Document::new("terms", "loans.pdf").with_page(1);
        let p2 = Document::new("terms", "loans.pdf").with_page(2);
        assert_ne!(p1.key(), p2.key());
    }

    #[test]
    fn test_key_ignores_content() {
        // Same source/page is the same logical unit even if content differs
        let a = Document::new("old text", "loans.pdf").with_page(1);
        let b = Document::new("new text", "loans.pdf").with_page(1);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_without_page() {
        let doc = Document::new("content", "faq.pdf");
        assert_eq!(doc.key(), ("faq.pdf".to_string(), None));
    }
}
