//! ragfuse: hybrid retrieval and reranking for RAG pipelines
//!
//! A pluggable retrieval core combining:
//! - An in-memory Okapi BM25 index built per corpus snapshot
//! - An external semantic retriever, consumed as a trait object
//! - Weighted-union rank fusion of the two signals
//! - Optional cross-encoder reranking (ONNX Runtime, behind the `onnx` feature)
//!
//! The pipeline selector assembles one of three strategies (`semantic`,
//! `hybrid`, `hybrid+reranker`) behind the single [`Retriever`] interface,
//! with identical sync and async semantics. Everything is deterministic:
//! a fixed corpus and query always produce the same ranking.

pub mod config;
pub mod retrieval;
pub mod types;
pub mod util;

pub use config::{RerankerConfig, RetrievalConfig, RetrievalMode};
pub use retrieval::{
    tokenize, Bm25Index, FusionConfig, HybridRetriever, PairScorer, Reranker, RerankingRetriever,
    RetrievalError, RetrievalPipeline, Retriever, RetrieverSlot,
};
pub use types::{DocKey, DocMetadata, Document};
