//! Configuration for the retrieval pipeline

use crate::retrieval::RetrievalError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Retrieval strategy selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalMode {
    /// Semantic vector search only
    #[serde(rename = "semantic")]
    Semantic,
    /// Semantic search fused with BM25 keyword search
    #[serde(rename = "hybrid")]
    Hybrid,
    /// Hybrid fusion followed by cross-encoder reranking
    #[serde(rename = "hybrid+reranker")]
    HybridReranker,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Hybrid => "hybrid",
            RetrievalMode::HybridReranker => "hybrid+reranker",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for RetrievalMode {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(RetrievalMode::Semantic),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            "hybrid+reranker" => Ok(RetrievalMode::HybridReranker),
            other => Err(RetrievalError::InvalidMode(other.to_string())),
        }
    }
}

fn default_mode() -> RetrievalMode {
    RetrievalMode::Semantic
}

fn default_k() -> usize {
    4
}

fn default_rerank_candidates() -> usize {
    12
}

fn default_semantic_weight() -> f64 {
    2.0
}

fn default_bm25_weight() -> f64 {
    1.0
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Retrieval strategy
    #[serde(default = "default_mode")]
    pub mode: RetrievalMode,
    /// Results taken from the semantic retriever before fusion
    #[serde(default = "default_k")]
    pub semantic_k: usize,
    /// Results requested from the BM25 index before fusion
    #[serde(default = "default_k")]
    pub bm25_k: usize,
    /// Final result count in hybrid mode
    #[serde(default = "default_k")]
    pub hybrid_k: usize,
    /// Final result count in hybrid+reranker mode
    #[serde(default = "default_k")]
    pub reranker_k: usize,
    /// Candidates requested from fusion for the reranking stage.
    /// Must be at least `reranker_k`; the reranker down-selects from this pool.
    #[serde(default = "default_rerank_candidates")]
    pub rerank_candidates: usize,
    /// Fusion weight for documents found by semantic search
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    /// Fusion weight for documents found by BM25
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,
    /// Cross-encoder reranker configuration
    #[serde(default)]
    pub reranker: RerankerConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            semantic_k: default_k(),
            bm25_k: default_k(),
            hybrid_k: default_k(),
            reranker_k: default_k(),
            rerank_candidates: default_rerank_candidates(),
            semantic_weight: default_semantic_weight(),
            bm25_weight: default_bm25_weight(),
            reranker: RerankerConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        let config: RetrievalConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together so the user
    /// can fix everything in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.semantic_k == 0 {
            errors.push("semantic_k must be positive".to_string());
        }
        if self.bm25_k == 0 {
            errors.push("bm25_k must be positive".to_string());
        }
        if self.hybrid_k == 0 {
            errors.push("hybrid_k must be positive".to_string());
        }
        if self.reranker_k == 0 {
            errors.push("reranker_k must be positive".to_string());
        }
        if self.rerank_candidates == 0 {
            errors.push("rerank_candidates must be positive".to_string());
        }
        if self.rerank_candidates < self.reranker_k {
            errors.push(format!(
                "rerank_candidates ({}) must be at least reranker_k ({})",
                self.rerank_candidates, self.reranker_k
            ));
        }
        if !self.semantic_weight.is_finite() || self.semantic_weight <= 0.0 {
            errors.push("semantic_weight must be a positive finite number".to_string());
        }
        if !self.bm25_weight.is_finite() || self.bm25_weight <= 0.0 {
            errors.push("bm25_weight must be a positive finite number".to_string());
        }
        if self.reranker.provider != "onnx" {
            errors.push(format!(
                "unsupported reranker provider: {} (supported: onnx)",
                self.reranker.provider
            ));
        }
        if self.reranker.max_length == 0 {
            errors.push("reranker max_length must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn default_provider() -> String {
    "onnx".to_string()
}

fn default_max_length() -> usize {
    512
}

/// Cross-encoder reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Scoring backend provider; only "onnx" is supported
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Path to the cross-encoder ONNX model file
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Path to the matching tokenizer file
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
    /// Maximum token length per (query, passage) pair
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_path: None,
            tokenizer_path: None,
            max_length: default_max_length(),
        }
    }
}
