//! Retrieval planning: turn a question into a ranked, de-duplicated set of
//! context chunks.

use crate::storage::VectorStore;
use alcove_context::ChunkId;
use alcove_embed::EmbeddingProvider;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Search inflation never asks the store for more than this many candidates.
const MAX_CANDIDATES: usize = 50;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Final number of chunks returned.
    pub top_k: usize,
    /// Minimum similarity; candidates below it are dropped. `None` keeps
    /// everything.
    pub min_score: Option<f32>,
    /// Max chunks kept per document path; 0 disables the cap.
    pub per_doc_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: None,
            per_doc_cap: 2,
        }
    }
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub path: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

pub struct RetrievalPlanner {
    store: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl RetrievalPlanner {
    pub fn new(
        store: Arc<VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<VectorStore> {
        self.store.clone()
    }

    /// Embed the question and return at most `top_k` chunks, score
    /// descending. The store is over-queried so that the per-document cap
    /// and score threshold still leave enough candidates; an empty result
    /// is a valid outcome, not an error.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        if self.config.top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self
            .provider
            .embed_text(query)
            .await
            .context("embedding the query")?;

        let headroom = (self.config.per_doc_cap + 1).max(2);
        let candidates = (self.config.top_k * headroom).clamp(self.config.top_k, MAX_CANDIDATES.max(self.config.top_k));
        let hits = self.store.search(&embedding, candidates).await?;
        debug!(candidates = hits.len(), "retrieval candidates");

        let mut per_doc: HashMap<String, usize> = HashMap::new();
        let mut selected = Vec::with_capacity(self.config.top_k);
        for hit in hits {
            if let Some(min) = self.config.min_score {
                if hit.score < min {
                    continue;
                }
            }
            if self.config.per_doc_cap > 0 {
                let count = per_doc.entry(hit.chunk.path.clone()).or_insert(0);
                if *count >= self.config.per_doc_cap {
                    continue;
                }
                *count += 1;
            }
            selected.push(ScoredChunk {
                id: hit.chunk.id,
                path: hit.chunk.path,
                text: hit.chunk.text,
                start: hit.chunk.start,
                end: hit.chunk.end,
                score: hit.score,
            });
            if selected.len() == self.config.top_k {
                break;
            }
        }
        Ok(selected)
    }
}
