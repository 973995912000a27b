//! Retrieval pipeline assembly
//!
//! Builds one of three retrieval strategies behind the common [`Retriever`]
//! interface, from configuration plus the current corpus snapshot. Nothing
//! is cached across snapshots: a reindex re-derives the whole retriever, so
//! stale indexes are never served.

use super::bm25::Bm25Index;
use super::hybrid::{FusionConfig, HybridRetriever};
use super::reranker::Reranker;
use super::{RetrievalError, Retriever};
use crate::config::{RetrievalConfig, RetrievalMode};
use crate::types::Document;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Retriever wrapper that reranks its inner retriever's candidates.
///
/// The inner retriever should produce a wider candidate pool than `k`; the
/// cross-encoder down-selects to the final `k`.
#[derive(Debug)]
pub struct RerankingRetriever {
    inner: Arc<dyn Retriever>,
    reranker: Arc<Reranker>,
    k: usize,
}

impl RerankingRetriever {
    pub fn new(inner: Arc<dyn Retriever>, reranker: Arc<Reranker>, k: usize) -> Self {
        Self { inner, reranker, k }
    }
}

#[async_trait]
impl Retriever for RerankingRetriever {
    fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let candidates = self.inner.retrieve(query)?;
        self.reranker.rerank(query, candidates, Some(self.k))
    }

    async fn retrieve_async(&self, query: &str) -> Result<Vec<Document>> {
        let candidates = self.inner.retrieve_async(query).await?;

        // Batched inference is synchronous CPU work; run it off the runtime
        let reranker = Arc::clone(&self.reranker);
        let owned_query = query.to_string();
        let k = self.k;
        tokio::task::spawn_blocking(move || reranker.rerank(&owned_query, candidates, Some(k)))
            .await?
    }
}

/// Assembles retrievers for the configured mode.
///
/// Construct one per process: the reranker handle inside lives for the
/// process lifetime, while `retriever` derives a fresh strategy object from
/// each corpus snapshot.
pub struct RetrievalPipeline {
    config: RetrievalConfig,
    reranker: Option<Arc<Reranker>>,
}

impl RetrievalPipeline {
    /// Validate the configuration and prepare the pipeline.
    ///
    /// In `hybrid+reranker` mode this creates the long-lived reranker
    /// handle; the model itself still loads lazily on first use.
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        config.validate()?;
        let reranker = match config.mode {
            RetrievalMode::HybridReranker => {
                Some(Arc::new(Reranker::new(config.reranker.clone())?))
            }
            _ => None,
        };
        Ok(Self { config, reranker })
    }

    /// Prepare the pipeline with a caller-supplied reranker (for custom
    /// scoring backends).
    pub fn with_reranker(config: RetrievalConfig, reranker: Reranker) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            reranker: Some(Arc::new(reranker)),
        })
    }

    pub fn mode(&self) -> RetrievalMode {
        self.config.mode
    }

    /// Assemble the retriever for the current corpus snapshot.
    ///
    /// `documents` is required for the two hybrid modes and ignored in
    /// semantic mode. The returned object is immutable; on reindex, call
    /// again with the new snapshot and publish the result (see
    /// [`RetrieverSlot`]).
    pub fn retriever(
        &self,
        semantic: Arc<dyn Retriever>,
        documents: Option<&[Document]>,
    ) -> Result<Arc<dyn Retriever>> {
        match self.config.mode {
            RetrievalMode::Semantic => {
                debug!("retrieval mode semantic: passing the semantic retriever through");
                Ok(semantic)
            }
            RetrievalMode::Hybrid => {
                let hybrid = self.build_hybrid(semantic, documents, self.config.hybrid_k)?;
                Ok(Arc::new(hybrid))
            }
            RetrievalMode::HybridReranker => {
                // Fusion produces the wider candidate pool the reranker
                // down-selects from
                let hybrid =
                    self.build_hybrid(semantic, documents, self.config.rerank_candidates)?;
                let reranker = self.reranker.clone().ok_or_else(|| {
                    anyhow::anyhow!("hybrid+reranker pipeline constructed without a reranker")
                })?;
                Ok(Arc::new(RerankingRetriever::new(
                    Arc::new(hybrid),
                    reranker,
                    self.config.reranker_k,
                )))
            }
        }
    }

    fn build_hybrid(
        &self,
        semantic: Arc<dyn Retriever>,
        documents: Option<&[Document]>,
        hybrid_k: usize,
    ) -> Result<HybridRetriever> {
        let documents =
            documents.ok_or(RetrievalError::MissingDocuments(self.config.mode))?;
        let index = Arc::new(Bm25Index::new(documents));
        info!(
            "assembled {} retriever over {} documents",
            self.config.mode,
            documents.len()
        );
        Ok(HybridRetriever::new(
            semantic,
            index,
            FusionConfig {
                semantic_k: self.config.semantic_k,
                bm25_k: self.config.bm25_k,
                hybrid_k,
                semantic_weight: self.config.semantic_weight,
                bm25_weight: self.config.bm25_weight,
            },
        ))
    }
}

/// Atomic publish point for the currently active retriever.
///
/// Reindexing builds a complete new retriever and `store`s it in one step;
/// queries already in flight keep the handle they `load`ed, so a swap is
/// never observable mid-search.
pub struct RetrieverSlot {
    current: RwLock<Arc<dyn Retriever>>,
}

impl RetrieverSlot {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            current: RwLock::new(retriever),
        }
    }

    /// Snapshot of the active retriever
    pub fn load(&self) -> Arc<dyn Retriever> {
        self.current.read().clone()
    }

    /// Publish a freshly built retriever
    pub fn store(&self, retriever: Arc<dyn Retriever>) {
        *self.current.write() = retriever;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::reranker::PairScorer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StaticRetriever {
        docs: Vec<Document>,
    }

    #[async_trait]
    impl Retriever for StaticRetriever {
        fn retrieve(&self, _query: &str) -> Result<Vec<Document>> {
            Ok(self.docs.clone())
        }

        async fn retrieve_async(&self, query: &str) -> Result<Vec<Document>> {
            self.retrieve(query)
        }
    }

    /// Scorer recording the largest batch it was asked to score
    struct BatchProbe {
        max_batch: AtomicUsize,
    }

    impl BatchProbe {
        fn new() -> Self {
            Self {
                max_batch: AtomicUsize::new(0),
            }
        }
    }

    impl PairScorer for BatchProbe {
        fn score_pairs(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>> {
            self.max_batch.fetch_max(passages.len(), Ordering::SeqCst);
            // Score by passage length so the ordering is deterministic
            Ok(passages.iter().map(|p| p.len() as f32).collect())
        }
    }

    fn doc(source: &str, content: &str) -> Document {
        Document::new(content, source)
    }

    fn corpus() -> Vec<Document> {
        vec![
            doc("a.pdf", "early repayment is free of charge"),
            doc("b.pdf", "life insurance is optional"),
            doc("c.pdf", "card delivery takes two business days"),
            doc("d.pdf", "repayment schedule for consumer loans"),
            doc("e.pdf", "mortgage rates depend on the down payment"),
        ]
    }

    fn semantic_stub(docs: Vec<Document>) -> Arc<dyn Retriever> {
        Arc::new(StaticRetriever { docs })
    }

    fn config_for(mode: RetrievalMode) -> RetrievalConfig {
        RetrievalConfig {
            mode,
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn test_semantic_mode_passes_retriever_through() {
        let pipeline = RetrievalPipeline::new(config_for(RetrievalMode::Semantic)).unwrap();
        let semantic = semantic_stub(corpus());
        let retriever = pipeline.retriever(Arc::clone(&semantic), None).unwrap();
        // Zero hybrid machinery: the very same object comes back
        assert!(Arc::ptr_eq(&retriever, &semantic));
    }

    #[test]
    fn test_hybrid_mode_requires_documents() {
        let pipeline = RetrievalPipeline::new(config_for(RetrievalMode::Hybrid)).unwrap();
        let err = pipeline.retriever(semantic_stub(vec![]), None).unwrap_err();
        assert!(err
            .to_string()
            .contains("hybrid mode requires the document collection"));
    }

    #[test]
    fn test_hybrid_reranker_mode_requires_documents() {
        let pipeline =
            RetrievalPipeline::new(config_for(RetrievalMode::HybridReranker)).unwrap();
        let err = pipeline.retriever(semantic_stub(vec![]), None).unwrap_err();
        assert!(err
            .to_string()
            .contains("hybrid+reranker mode requires the document collection"));
    }

    #[test]
    fn test_hybrid_mode_fuses_and_truncates() {
        let docs = corpus();
        let pipeline = RetrievalPipeline::new(config_for(RetrievalMode::Hybrid)).unwrap();
        // Semantic returns a.pdf and b.pdf; BM25 will also surface a.pdf
        let semantic = semantic_stub(vec![docs[0].clone(), docs[1].clone()]);
        let retriever = pipeline.retriever(semantic, Some(&docs)).unwrap();

        let results = retriever.retrieve("repayment").unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 4);
        // a.pdf is found by both signals and must rank first
        assert_eq!(results[0].metadata.source, "a.pdf");
    }

    #[test]
    fn test_reranker_sees_wider_pool_than_final_output() {
        let docs = corpus();
        let mut config = config_for(RetrievalMode::HybridReranker);
        config.semantic_k = 5;
        config.bm25_k = 5;
        config.reranker_k = 2;
        config.rerank_candidates = 5;

        let probe = Arc::new(BatchProbe::new());
        let pipeline = RetrievalPipeline::with_reranker(
            config,
            Reranker::with_scorer(Arc::clone(&probe) as Arc<dyn PairScorer>),
        )
        .unwrap();

        let semantic = semantic_stub(docs.clone());
        let retriever = pipeline.retriever(semantic, Some(&docs)).unwrap();
        let results = retriever.retrieve("repayment insurance").unwrap();

        assert_eq!(results.len(), 2, "final output is reranker_k");
        let pool = probe.max_batch.load(Ordering::SeqCst);
        assert!(
            pool > 2,
            "reranker must score a wider pool than it returns, saw {}",
            pool
        );
    }

    #[test]
    fn test_reranker_output_clamped_to_available_candidates() {
        let docs = vec![doc("only.pdf", "early repayment is free of charge")];
        let mut config = config_for(RetrievalMode::HybridReranker);
        config.reranker_k = 4;
        config.rerank_candidates = 12;

        let pipeline = RetrievalPipeline::with_reranker(
            config,
            Reranker::with_scorer(Arc::new(BatchProbe::new())),
        )
        .unwrap();

        let retriever = pipeline
            .retriever(semantic_stub(docs.clone()), Some(&docs))
            .unwrap();
        let results = retriever.retrieve("repayment").unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = config_for(RetrievalMode::Hybrid);
        config.hybrid_k = 0;
        assert!(RetrievalPipeline::new(config).is_err());
    }

    #[test]
    fn test_new_rejects_unknown_reranker_provider() {
        let mut config = config_for(RetrievalMode::HybridReranker);
        config.reranker.provider = "tensorrt".to_string();
        assert!(RetrievalPipeline::new(config).is_err());
    }

    #[test]
    fn test_slot_swaps_atomically_for_new_loads() {
        let docs = corpus();
        let pipeline = RetrievalPipeline::new(config_for(RetrievalMode::Hybrid)).unwrap();

        let old = pipeline
            .retriever(semantic_stub(vec![docs[0].clone()]), Some(&docs[..1]))
            .unwrap();
        let slot = RetrieverSlot::new(old);

        // An in-flight query holds the handle it loaded
        let in_flight = slot.load();

        let new = pipeline
            .retriever(semantic_stub(vec![docs[1].clone()]), Some(&docs[1..2]))
            .unwrap();
        slot.store(Arc::clone(&new));

        assert!(Arc::ptr_eq(&slot.load(), &new));
        assert!(!Arc::ptr_eq(&in_flight, &new));
        // The old handle still answers queries over the old snapshot
        let results = in_flight.retrieve("repayment").unwrap();
        assert_eq!(results[0].metadata.source, "a.pdf");
    }

    #[tokio::test]
    async fn test_reranking_retriever_async_matches_sync() {
        let docs = corpus();
        let mut config = config_for(RetrievalMode::HybridReranker);
        config.reranker_k = 3;

        let pipeline = RetrievalPipeline::with_reranker(
            config,
            Reranker::with_scorer(Arc::new(BatchProbe::new())),
        )
        .unwrap();

        let retriever = pipeline
            .retriever(semantic_stub(docs.clone()), Some(&docs))
            .unwrap();

        let sync_results = retriever.retrieve("repayment insurance").unwrap();
        let async_results = retriever.retrieve_async("repayment insurance").await.unwrap();
        assert_eq!(sync_results, async_results);
    }
}
