//! The indexing engine: drives scan → chunk → embed → store for a document
//! root, concurrently per document, with per-document failure isolation.

use crate::retrieval::scanner::{self, ChangeScanner};
use crate::storage::{StoreError, VectorStore};
use alcove_context::{ChunkingConfig, TextChunker};
use alcove_embed::{EmbedError, EmbeddingProvider};
use anyhow::{Context, Result, bail};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IndexingEngineConfig {
    pub root: PathBuf,
    pub chunking: ChunkingConfig,
    /// Width of the concurrent read+chunk+embed pool.
    pub max_workers: usize,
    /// Total attempts per embedding call (first try included).
    pub max_embed_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_base_delay: Duration,
}

impl IndexingEngineConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunking: ChunkingConfig::default(),
            max_workers: 4,
            max_embed_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_embed_retries(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.max_embed_attempts = attempts.max(1);
        self.retry_base_delay = base_delay;
        self
    }
}

/// Counters for one indexing run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Live chunks in the store after the run.
    pub chunk_count: usize,
}

enum ProcessOutcome {
    Indexed,
    /// File exists but cannot be indexed (not UTF-8). Not an error.
    Undecodable,
}

pub struct IndexingEngine {
    config: IndexingEngineConfig,
    store: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    chunker: TextChunker,
}

impl IndexingEngine {
    pub fn new(
        config: IndexingEngineConfig,
        store: Arc<VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let chunker = TextChunker::new(config.chunking);
        Self {
            config,
            store,
            provider,
            chunker,
        }
    }

    pub fn store(&self) -> Arc<VectorStore> {
        self.store.clone()
    }

    /// Bring the store up to date with the document root and persist it.
    ///
    /// `force` discards the existing index and rebuilds everything. Without
    /// it, a persisted index is loaded first (an empty or corrupt one falls
    /// back to a from-scratch build) and only changed documents are
    /// reprocessed. A document that fails embedding is logged and counted,
    /// never fatal to the run.
    pub async fn reindex(&self, force: bool) -> Result<IndexReport> {
        if force {
            info!("force reindex, discarding existing index");
            self.store.clear().await;
        } else if self.store.stats().await.document_count == 0 {
            match self.store.load().await {
                Ok(true) => debug!("persisted index loaded"),
                Ok(false) => debug!("no persisted index, building fresh"),
                Err(StoreError::Corruption(msg)) => {
                    warn!(%msg, "persisted index unusable, rebuilding from scratch");
                    self.store.clear().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let known = self.store.document_snapshot().await;
        let scanner = ChangeScanner::new(self.config.root.clone());
        let changes = tokio::task::spawn_blocking(move || scanner.scan(&known)).await?;
        info!(
            new = changes.new.len(),
            modified = changes.modified.len(),
            unchanged = changes.unchanged.len(),
            removed = changes.removed.len(),
            skipped = changes.skipped.len(),
            "scan complete"
        );

        let mut report = IndexReport {
            unchanged: changes.unchanged.len(),
            skipped: changes.skipped.len(),
            ..IndexReport::default()
        };

        let work: Vec<(String, bool)> = changes
            .new
            .iter()
            .map(|p| (p.clone(), true))
            .chain(changes.modified.iter().map(|p| (p.clone(), false)))
            .collect();

        let results: Vec<(String, bool, Result<ProcessOutcome>)> = stream::iter(work)
            .map(|(path, is_new)| async move {
                let outcome = self.process_document(&path).await;
                (path, is_new, outcome)
            })
            .buffer_unordered(self.config.max_workers)
            .collect()
            .await;

        for (path, is_new, outcome) in results {
            match outcome {
                Ok(ProcessOutcome::Indexed) => {
                    if is_new {
                        report.new += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                Ok(ProcessOutcome::Undecodable) => report.skipped += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "document failed, continuing run");
                    report.failed += 1;
                }
            }
        }

        for path in &changes.removed {
            let dropped = self.store.remove_document(path).await;
            debug!(path = %path, chunks = dropped, "removed vanished document");
            report.removed += 1;
        }

        if force {
            self.store.compact().await;
        }
        self.store.persist().await?;
        report.chunk_count = self.store.stats().await.chunk_count;
        info!(?report, "indexing run finished");
        Ok(report)
    }

    async fn process_document(&self, rel: &str) -> Result<ProcessOutcome> {
        let abs = self.config.root.join(rel);
        let bytes = tokio::fs::read(&abs)
            .await
            .with_context(|| format!("reading {rel}"))?;
        let Ok(text) = String::from_utf8(bytes) else {
            warn!(path = %rel, "file is not valid utf-8, skipping");
            return Ok(ProcessOutcome::Undecodable);
        };
        let content_hash = blake3::hash(text.as_bytes()).to_hex().to_string();
        let meta = tokio::fs::metadata(&abs)
            .await
            .with_context(|| format!("stat {rel}"))?;

        let chunks = self.chunker.chunk(rel, &text);
        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            self.embed_with_retry(&texts)
                .await
                .with_context(|| format!("embedding {rel}"))?
        };
        if embeddings.len() != chunks.len() {
            bail!(
                "{rel}: embedding count {} does not match chunk count {}",
                embeddings.len(),
                chunks.len()
            );
        }

        let entries = chunks.into_iter().zip(embeddings).collect();
        self.store
            .upsert_document(
                rel,
                &content_hash,
                meta.len(),
                scanner::mtime_secs(&meta),
                entries,
            )
            .await?;
        Ok(ProcessOutcome::Indexed)
    }

    /// Embedding is idempotent, so transient failures get bounded
    /// exponential backoff before the document is given up on.
    async fn embed_with_retry(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
        let mut delay = self.config.retry_base_delay;
        let mut attempt = 1u32;
        loop {
            match self.provider.embed_texts(texts).await {
                Ok(result) => return Ok(result.embeddings),
                Err(e) if e.is_transient() && attempt < self.config.max_embed_attempts => {
                    warn!(attempt, error = %e, "transient embedding failure, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
