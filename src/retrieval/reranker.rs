//! Cross-encoder reranking
//!
//! A second-pass reorder of fusion candidates using a pairwise relevance
//! model. The model handle is process-wide: construct one [`Reranker`] at
//! startup and share it; the model itself loads lazily on the first call,
//! so pipelines never configured for reranking never pay the load cost.

use super::RetrievalError;
use crate::config::RerankerConfig;
use crate::types::Document;
use crate::util::preview;
use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "onnx")]
use {
    ort::{execution_providers::CPUExecutionProvider, session::Session, value::Tensor},
    parking_lot::Mutex,
    std::path::Path,
    tokenizers::Tokenizer,
    tracing::info,
};

/// Scores (query, passage) pairs for relevance.
///
/// One batched call scores every passage against the query. Implementations
/// must be deterministic for a fixed input.
pub trait PairScorer: Send + Sync {
    /// Return one relevance score per passage, higher is more relevant
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Cross-encoder reranker over any [`PairScorer`] backend.
pub struct Reranker {
    config: RerankerConfig,
    scorer: OnceCell<Arc<dyn PairScorer>>,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("config", &self.config)
            .field("scorer_loaded", &self.scorer.get().is_some())
            .finish()
    }
}

impl Reranker {
    /// Validate the configured provider. The model is not loaded here;
    /// the first `rerank` call loads it and surfaces any load failure.
    pub fn new(config: RerankerConfig) -> Result<Self, RetrievalError> {
        if config.provider != "onnx" {
            return Err(RetrievalError::InvalidProvider(config.provider.clone()));
        }
        debug!(
            "cross-encoder reranker configured (model {:?} loads on first use)",
            config.model_path
        );
        Ok(Self {
            config,
            scorer: OnceCell::new(),
        })
    }

    /// Use a caller-supplied scoring backend instead of the built-in ONNX
    /// cross-encoder. The backend counts as already loaded.
    pub fn with_scorer(scorer: Arc<dyn PairScorer>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(scorer);
        Self {
            config: RerankerConfig::default(),
            scorer: cell,
        }
    }

    /// Reorder `documents` by descending pairwise relevance to `query`.
    ///
    /// Equal scores keep their input order. With `top_k` the output is
    /// truncated to `min(top_k, documents.len())`; otherwise the full
    /// reordered sequence is returned. An empty input returns empty without
    /// touching (or loading) the model.
    pub fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        top_k: Option<usize>,
    ) -> Result<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let scorer = self.scorer()?;
        let passages: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let scores = scorer.score_pairs(query, &passages)?;
        anyhow::ensure!(
            scores.len() == documents.len(),
            "scorer returned {} scores for {} documents",
            scores.len(),
            documents.len()
        );

        let total = documents.len();
        let mut scored: Vec<(Document, f32)> = documents.into_iter().zip(scores).collect();
        // Stable sort: equal scores keep input order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        if let Some(k) = top_k {
            scored.truncate(k);
        }

        let results: Vec<Document> = scored.into_iter().map(|(doc, _)| doc).collect();

        debug!(
            "cross-encoder reranking for '{}': {} scored, {} returned",
            preview(query, 50),
            total,
            results.len()
        );

        Ok(results)
    }

    fn scorer(&self) -> Result<&Arc<dyn PairScorer>, RetrievalError> {
        self.scorer.get_or_try_init(|| self.load_scorer())
    }

    #[cfg(feature = "onnx")]
    fn load_scorer(&self) -> Result<Arc<dyn PairScorer>, RetrievalError> {
        let model_path = self.config.model_path.as_deref().ok_or_else(|| {
            RetrievalError::ModelLoad("reranker model_path is not configured".to_string())
        })?;
        let tokenizer_path = self.config.tokenizer_path.as_deref().ok_or_else(|| {
            RetrievalError::ModelLoad("reranker tokenizer_path is not configured".to_string())
        })?;
        let encoder = OnnxCrossEncoder::load(model_path, tokenizer_path, self.config.max_length)?;
        Ok(Arc::new(encoder))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_scorer(&self) -> Result<Arc<dyn PairScorer>, RetrievalError> {
        Err(RetrievalError::ModelLoad(
            "built without the `onnx` feature; enable it to load cross-encoder models".to_string(),
        ))
    }
}

/// ONNX cross-encoder backend (ms-marco-MiniLM style models)
#[cfg(feature = "onnx")]
pub struct OnnxCrossEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
}

#[cfg(feature = "onnx")]
impl OnnxCrossEncoder {
    /// Load the model and tokenizer from disk.
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        max_length: usize,
    ) -> Result<Self, RetrievalError> {
        info!("Loading cross-encoder model from {}...", model_path.display());

        let session = Session::builder()
            .and_then(|b| b.with_execution_providers([CPUExecutionProvider::default().build()]))
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| {
                RetrievalError::ModelLoad(format!("{}: {}", model_path.display(), e))
            })?;

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            RetrievalError::ModelLoad(format!("{}: {}", tokenizer_path.display(), e))
        })?;

        info!("Cross-encoder model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length,
        })
    }
}

#[cfg(feature = "onnx")]
impl PairScorer for OnnxCrossEncoder {
    fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        // Tokenize all (query, passage) pairs in one batch
        let inputs: Vec<(String, String)> = passages
            .iter()
            .map(|p| (query.to_string(), p.to_string()))
            .collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_length);

        let batch_size = passages.len();
        let mut input_ids: Vec<i64> = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask: Vec<i64> = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let len = ids.len().min(max_len);

            for i in 0..max_len {
                if i < len {
                    input_ids.push(ids[i] as i64);
                    attention_mask.push(1);
                } else {
                    input_ids.push(0);
                    attention_mask.push(0);
                }
            }
        }

        let shape = [batch_size, max_len];

        // Run inference and copy the logits out of the session
        let (logits_shape, logits_data): (Vec<usize>, Vec<f32>) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                "input_ids" => Tensor::from_array((shape, input_ids))?,
                "attention_mask" => Tensor::from_array((shape, attention_mask))?,
            ])?;

            let (_, value) = outputs
                .iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("No output tensor"))?;

            let arr = value.try_extract_array::<f32>()?;
            (arr.shape().to_vec(), arr.iter().copied().collect())
        };

        let logits =
            ndarray::ArrayViewD::from_shape(logits_shape.as_slice(), logits_data.as_slice())?;

        // Two logits: take the positive class. One logit: sigmoid it.
        let scores: Vec<f32> = (0..batch_size)
            .map(|i| {
                if logits.ndim() > 1 && logits.shape()[1] > 1 {
                    logits[[i, 1]]
                } else {
                    sigmoid(logits[[i, 0]])
                }
            })
            .collect();

        Ok(scores)
    }
}

#[cfg(feature = "onnx")]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
