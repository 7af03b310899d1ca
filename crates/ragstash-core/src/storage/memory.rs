//! In-memory document store for Ragstash.

use super::{prepare, RagBackend};
use crate::chunk::tokenize;
use crate::config::{MemoryParams, Settings};
use crate::error::{Error, Result};
use crate::models::{rank, Document, IngestionTask, ScoredDocument};
use crate::provider::Provider;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[derive(Debug, Clone)]
struct StoredChunk {
    document_id: String,
    text: String,
    term_counts: HashMap<String, u32>,
    length: usize,
}

impl StoredChunk {
    fn new(document_id: &str, text: String) -> Self {
        let tokens = tokenize(&text);
        let length = tokens.len();
        let mut term_counts = HashMap::new();
        for token in tokens {
            *term_counts.entry(token).or_insert(0) += 1;
        }
        Self {
            document_id: document_id.to_string(),
            text,
            term_counts,
            length,
        }
    }
}

/// A simple in-memory implementation for testing and development.
///
/// Chunks are ranked with BM25, so scores are non-negative and unbounded above.
#[derive(Debug)]
pub struct MemoryBackend {
    default_index: String,
    settings: Settings,
    indexes: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl MemoryBackend {
    pub fn new(params: &MemoryParams, settings: &Settings) -> Self {
        let mut indexes = HashMap::new();
        indexes.insert(params.index.clone(), Vec::new());
        Self {
            default_index: params.index.clone(),
            settings: settings.clone(),
            indexes: RwLock::new(indexes),
        }
    }

    /// Number of stored chunks in `index`, if it exists.
    pub async fn chunk_count(&self, index: &str) -> Option<usize> {
        self.indexes.read().await.get(index).map(Vec::len)
    }

    /// Number of distinct documents stored in `index`.
    pub async fn document_count(&self, index: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|c| c.document_id.as_str())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    async fn store(&self, index: &str, document_id: &str, chunks: Vec<String>) -> Result<usize> {
        let stored: Vec<StoredChunk> = chunks
            .into_iter()
            .map(|text| StoredChunk::new(document_id, text))
            .collect();
        let count = stored.len();

        // One write lock for the whole document keeps it atomic for readers.
        let mut indexes = self.indexes.write().await;
        indexes.entry(index.to_string()).or_default().extend(stored);
        Ok(count)
    }
}

fn bm25(query_terms: &HashSet<String>, chunks: &[StoredChunk]) -> Vec<ScoredDocument> {
    let total = chunks.len() as f32;
    let avg_len = chunks.iter().map(|c| c.length).sum::<usize>() as f32 / total.max(1.0);

    let idf: HashMap<&str, f32> = query_terms
        .iter()
        .map(|term| {
            let df = chunks.iter().filter(|c| c.term_counts.contains_key(term)).count() as f32;
            (term.as_str(), (1.0 + (total - df + 0.5) / (df + 0.5)).ln())
        })
        .collect();

    chunks
        .iter()
        .map(|chunk| {
            let norm = 1.0 - BM25_B + BM25_B * chunk.length as f32 / avg_len.max(1.0);
            let score = query_terms
                .iter()
                .filter_map(|term| {
                    let tf = *chunk.term_counts.get(term)? as f32;
                    Some(idf[term.as_str()] * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * norm))
                })
                .sum();
            ScoredDocument {
                text: chunk.text.clone(),
                score,
            }
        })
        .collect()
}

#[async_trait]
impl RagBackend for MemoryBackend {
    fn provider(&self) -> Provider {
        Provider::Memory
    }

    fn default_index(&self) -> &str {
        &self.default_index
    }

    async fn ingest(&self, document: &Document) -> IngestionTask {
        let task = IngestionTask::pending(document.index_or(&self.default_index));
        let outcome = match prepare(document, &task.index, &self.settings) {
            Ok(prepared) => self.store(&task.index, &task.document_id, prepared.chunks).await,
            Err(err) => Err(err),
        };
        task.finish(outcome)
    }

    async fn retrieve(&self, query: &str, index: &str) -> Result<Vec<ScoredDocument>> {
        let indexes = self.indexes.read().await;
        let chunks = indexes
            .get(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;

        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() || chunks.is_empty() {
            return Ok(Vec::new());
        }

        let hits = bm25(&query_terms, chunks);
        Ok(rank(hits, self.settings.min_score, self.settings.top_k))
    }
}
