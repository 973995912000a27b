//! Hybrid retrieval pipeline
//!
//! Combines:
//! - In-memory BM25 lexical scoring over a corpus snapshot
//! - An external semantic retriever consumed as a trait object
//! - Weighted-union rank fusion of the two signals
//! - Optional cross-encoder reranking

mod bm25;
mod hybrid;
mod pipeline;
mod reranker;
mod tokenize;

pub use bm25::*;
pub use hybrid::*;
pub use pipeline::*;
pub use reranker::*;
pub use tokenize::tokenize;

use crate::config::RetrievalMode;
use crate::types::Document;
use anyhow::Result;
use async_trait::async_trait;

/// Errors raised by pipeline assembly and reranking.
///
/// Failures of the external semantic retriever are not represented here;
/// they propagate unchanged through `anyhow::Result`.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Unknown retrieval mode string
    #[error("invalid retrieval mode: {0} (expected semantic, hybrid or hybrid+reranker)")]
    InvalidMode(String),

    /// Hybrid modes need the corpus to build the lexical index from
    #[error("{0} mode requires the document collection for BM25 indexing")]
    MissingDocuments(RetrievalMode),

    /// Unsupported reranker provider in configuration
    #[error("unsupported reranker provider: {0} (supported: onnx)")]
    InvalidProvider(String),

    /// Cross-encoder model failed to load
    #[error("failed to load cross-encoder model: {0}")]
    ModelLoad(String),
}

/// Common capability interface for all retrieval strategies.
///
/// The semantic passthrough, the hybrid fusion retriever and the reranking
/// wrapper all implement this, so the answer-generation stage works against
/// one contract regardless of the configured mode. The sync and async forms
/// return identical rankings for the same corpus and query.
#[async_trait]
pub trait Retriever: Send + Sync + std::fmt::Debug {
    /// Retrieve documents for a query, best first
    fn retrieve(&self, query: &str) -> Result<Vec<Document>>;

    /// Async form of [`retrieve`](Retriever::retrieve); same ordering and
    /// contents, with CPU-bound scoring moved off the async runtime
    async fn retrieve_async(&self, query: &str) -> Result<Vec<Document>>;
}
