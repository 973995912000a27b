//! Hybrid retrieval fusing semantic and BM25 rankings
//!
//! Fusion is a weighted union: each signal contributes a fixed weight per
//! document, weights sum when both signals agree, and agreement therefore
//! outranks any single signal.

use super::bm25::Bm25Index;
use super::Retriever;
use crate::types::{DocKey, Document};
use crate::util::preview;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Stage sizes and signal weights for hybrid fusion
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Cap on results taken from the semantic retriever
    pub semantic_k: usize,
    /// Top-K requested from the BM25 index
    pub bm25_k: usize,
    /// Final fused output size
    pub hybrid_k: usize,
    /// Weight for documents found by semantic search
    pub semantic_weight: f64,
    /// Weight for documents found by BM25
    pub bm25_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            semantic_k: 4,
            bm25_k: 4,
            hybrid_k: 4,
            semantic_weight: 2.0,
            bm25_weight: 1.0,
        }
    }
}

/// Retriever merging semantic and BM25 results by weighted union.
///
/// The semantic retriever is an external collaborator queried as-is; the
/// BM25 index is owned per corpus snapshot and shared read-only.
#[derive(Debug)]
pub struct HybridRetriever {
    semantic: Arc<dyn Retriever>,
    bm25: Arc<Bm25Index>,
    config: FusionConfig,
}

impl HybridRetriever {
    pub fn new(semantic: Arc<dyn Retriever>, bm25: Arc<Bm25Index>, config: FusionConfig) -> Self {
        Self {
            semantic,
            bm25,
            config,
        }
    }

    /// Merge the two ranked lists into one deduplicated weighted ranking.
    ///
    /// Semantic results insert first, so on equal accumulated weight they
    /// precede BM25-only results (the sort below is stable). The first
    /// insertion of a key keeps its `Document` copy; a later hit from the
    /// other signal only raises the weight.
    fn fuse(&self, mut semantic_docs: Vec<Document>, bm25_docs: Vec<Document>) -> Vec<Document> {
        semantic_docs.truncate(self.config.semantic_k);
        let semantic_count = semantic_docs.len();
        let bm25_count = bm25_docs.len();

        // Transient per-query score table, discarded after ranking
        let mut order: Vec<DocKey> = Vec::new();
        let mut table: HashMap<DocKey, (Document, f64)> = HashMap::new();

        for (docs, weight) in [
            (semantic_docs, self.config.semantic_weight),
            (bm25_docs, self.config.bm25_weight),
        ] {
            // A key contributes its weight at most once per signal
            let mut seen: HashSet<DocKey> = HashSet::new();
            for doc in docs {
                let key = doc.key();
                if !seen.insert(key.clone()) {
                    continue;
                }
                table
                    .entry(key.clone())
                    .and_modify(|(_, w)| *w += weight)
                    .or_insert_with(|| {
                        order.push(key);
                        (doc, weight)
                    });
            }
        }

        let mut fused: Vec<(Document, f64)> = order
            .into_iter()
            .filter_map(|key| table.remove(&key))
            .collect();
        // Stable sort: equal weights keep merge-insertion order
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        fused.truncate(self.config.hybrid_k);

        let results: Vec<Document> = fused.into_iter().map(|(doc, _)| doc).collect();

        debug!(
            "hybrid fusion: semantic {} + bm25 {} -> {} returned (top-{})",
            semantic_count,
            bm25_count,
            results.len(),
            self.config.hybrid_k
        );

        results
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let semantic_docs = self.semantic.retrieve(query)?;
        let bm25_docs = self.bm25.search(query, self.config.bm25_k);
        debug!("hybrid retrieval for '{}'", preview(query, 50));
        Ok(self.fuse(semantic_docs, bm25_docs))
    }

    async fn retrieve_async(&self, query: &str) -> Result<Vec<Document>> {
        let semantic_docs = self.semantic.retrieve_async(query).await?;

        // BM25 scoring is synchronous CPU work; run it off the async runtime
        let bm25 = Arc::clone(&self.bm25);
        let owned_query = query.to_string();
        let k = self.config.bm25_k;
        let bm25_docs = tokio::task::spawn_blocking(move || bm25.search(&owned_query, k)).await?;

        Ok(self.fuse(semantic_docs, bm25_docs))
    }
}
