//! In-memory Okapi BM25 index over a fixed corpus snapshot
//!
//! The index is immutable after construction; a reindex builds a fresh one.

use super::tokenize::tokenize;
use crate::types::Document;
use crate::util::preview;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Term-frequency saturation parameter
const K1: f64 = 1.5;
/// Document-length normalization parameter
const B: f64 = 0.75;
/// Floor factor for terms whose raw IDF comes out negative
const EPSILON: f64 = 0.25;

/// BM25 lexical index over an ordered document collection.
///
/// Construction tokenizes every document and precomputes all corpus
/// statistics; `search` is pure in-memory computation with no failure
/// modes. Document order is fixed at construction time and breaks score
/// ties, so rankings are identical across repeated searches.
#[derive(Debug)]
pub struct Bm25Index {
    documents: Vec<Document>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    /// Build an index from the corpus snapshot.
    pub fn new(documents: &[Document]) -> Self {
        let term_freqs: Vec<HashMap<String, usize>> = documents
            .iter()
            .map(|doc| {
                let mut freqs = HashMap::new();
                for term in tokenize(&doc.content) {
                    *freqs.entry(term).or_insert(0) += 1;
                }
                freqs
            })
            .collect();

        let doc_lens: Vec<usize> = term_freqs.iter().map(|tf| tf.values().sum()).collect();
        let total_len: usize = doc_lens.iter().sum();
        let avgdl = if documents.is_empty() {
            0.0
        } else {
            total_len as f64 / documents.len() as f64
        };

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for freqs in &term_freqs {
            for term in freqs.keys() {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        // Iterate terms in sorted order so the floating-point average (and
        // with it the epsilon floor) is identical across rebuilds.
        let mut by_term: Vec<(&str, usize)> = doc_freq.into_iter().collect();
        by_term.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let n = documents.len() as f64;
        let mut idf: HashMap<String, f64> = HashMap::with_capacity(by_term.len());
        let mut idf_sum = 0.0;
        let mut negative_terms: Vec<String> = Vec::new();
        for (term, df) in by_term {
            let value = ((n - df as f64 + 0.5) / (df as f64 + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative_terms.push(term.to_string());
            }
            idf.insert(term.to_string(), value);
        }
        // Terms present in most documents get a small positive weight
        // instead of a negative one (epsilon times the corpus average IDF).
        if !idf.is_empty() {
            let floor = EPSILON * (idf_sum / idf.len() as f64);
            for term in negative_terms {
                idf.insert(term, floor);
            }
        }

        if documents.is_empty() {
            warn!("BM25 index built over an empty corpus; all searches will return nothing");
        } else {
            info!(
                "BM25 index built for {} documents ({} distinct terms)",
                documents.len(),
                idf.len()
            );
        }

        Self {
            documents: documents.to_vec(),
            term_freqs,
            doc_lens,
            avgdl,
            idf,
        }
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Search the corpus, best first.
    ///
    /// A query with no indexable terms returns nothing rather than an
    /// arbitrary ranking. `k` larger than the corpus is clamped.
    pub fn search(&self, query: &str, k: usize) -> Vec<Document> {
        if self.documents.is_empty() {
            return Vec::new();
        }

        let terms = tokenize(query);
        if terms.is_empty() {
            debug!("BM25 search skipped: query '{}' has no indexable terms", preview(query, 50));
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = (0..self.documents.len())
            .map(|idx| (idx, self.score(idx, &terms)))
            .collect();
        // Stable sort: equal scores keep corpus order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.min(self.documents.len()));

        let results: Vec<Document> = scored
            .into_iter()
            .map(|(idx, _)| self.documents[idx].clone())
            .collect();

        debug!(
            "BM25 search for '{}': {} results (top-{})",
            preview(query, 50),
            results.len(),
            k
        );

        results
    }

    /// Okapi BM25 score of one document against the query term sequence
    fn score(&self, doc_idx: usize, terms: &[String]) -> f64 {
        let freqs = &self.term_freqs[doc_idx];
        let norm_len = if self.avgdl > 0.0 {
            self.doc_lens[doc_idx] as f64 / self.avgdl
        } else {
            0.0
        };
        let denom_base = K1 * (1.0 - B + B * norm_len);

        terms
            .iter()
            .map(|term| {
                let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                idf * (tf * (K1 + 1.0)) / (tf + denom_base)
            })
            .sum()
    }
}
