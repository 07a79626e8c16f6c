//! In-memory BM25 ranking index over document chunks.
//!
//! Scoring follows BM25-Okapi:
//!
//! ```text
//! idf(t)      = ln(N - n(t) + 0.5) - ln(n(t) + 0.5)
//! score(d, q) = Σ idf(t) · tf(t,d)·(k1+1) / (tf(t,d) + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! Terms that appear in more than half of the chunks get a negative raw idf;
//! those are floored at `epsilon · mean(idf)` so common words still count a
//! little instead of penalizing a match.
//!
//! The index is built once and is read-only afterwards. Share it behind an
//! `Arc` between requests; [`RankingIndex::rebuild`] produces a fresh index.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::chunk::split_document;
use crate::config::RetrievalConfig;
use crate::models::{DocumentChunk, RawDocument, RetrievalResult};

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

impl From<&RetrievalConfig> for Bm25Params {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            k1: config.k1,
            b: config.b,
            ..Self::default()
        }
    }
}

/// Lowercase Unicode word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let word = WORD.get_or_init(|| Regex::new(r"\w+").expect("static regex"));
    let lower = text.to_lowercase();
    word.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct RankingIndex {
    params: Bm25Params,
    chunks: Vec<DocumentChunk>,
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    idf: BTreeMap<String, f64>,
}

impl RankingIndex {
    /// Chunk, tokenize and index a corpus.
    pub fn build(documents: &[RawDocument], params: Bm25Params) -> Self {
        let chunks: Vec<DocumentChunk> = documents
            .iter()
            .flat_map(|doc| split_document(&doc.filename, &doc.body))
            .collect();

        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        // BTreeMap keeps the idf summation order fixed across builds.
        let mut doc_freqs: BTreeMap<String, u32> = BTreeMap::new();

        for chunk in &chunks {
            let tokens = tokenize(&chunk.content);
            doc_lens.push(tokens.len());

            let mut counts: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *counts.entry(token).or_insert(0) += 1;
            }
            for token in counts.keys() {
                *doc_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            term_freqs.push(counts);
        }

        let n = chunks.len() as f64;
        let avgdl = if chunks.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / n
        };

        let mut idf: BTreeMap<String, f64> = BTreeMap::new();
        let mut idf_sum = 0.0;
        let mut negative = Vec::new();
        for (term, df) in &doc_freqs {
            let df = *df as f64;
            let value = (n - df + 0.5).ln() - (df + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }

        if !idf.is_empty() {
            let average_idf = idf_sum / idf.len() as f64;
            let floor = params.epsilon * average_idf;
            // Tiny corpora can have a negative mean; keep the floor positive.
            let floor = if floor > 0.0 { floor } else { params.epsilon };
            for term in negative {
                idf.insert(term, floor);
            }
        }

        tracing::debug!(chunks = chunks.len(), terms = idf.len(), "built ranking index");

        Self {
            params,
            chunks,
            term_freqs,
            doc_lens,
            avgdl,
            idf,
        }
    }

    /// Build a new index from a (possibly changed) corpus with the same parameters.
    pub fn rebuild(&self, documents: &[RawDocument]) -> Self {
        Self::build(documents, self.params)
    }

    /// Top-`k` chunks by descending score; ties keep corpus order.
    pub fn search(&self, query: &str, k: usize) -> Vec<RetrievalResult> {
        if self.chunks.is_empty() || k == 0 {
            return Vec::new();
        }

        let scores = self.scores(&tokenize(query));
        let mut order: Vec<usize> = (0..self.chunks.len()).collect();
        // stable sort: equal scores stay in corpus order
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        order
            .into_iter()
            .take(k)
            .map(|i| RetrievalResult {
                chunk: self.chunks[i].clone(),
                score: scores[i],
            })
            .collect()
    }

    fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        let avgdl = if self.avgdl > 0.0 { self.avgdl } else { 1.0 };
        let mut scores = vec![0.0; self.chunks.len()];

        for token in query_tokens {
            let Some(idf) = self.idf.get(token) else {
                continue;
            };
            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let tf = freqs.get(token).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let norm = 1.0 - b + b * self.doc_lens[i] as f64 / avgdl;
                scores[i] += idf * (tf * (k1 + 1.0)) / (tf + k1 * norm);
            }
        }

        scores
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
