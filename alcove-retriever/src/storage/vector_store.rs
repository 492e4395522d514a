//! The in-memory vector store: flat similarity scan plus metadata tables.
//!
//! Vectors live in append-only slots; deleting a chunk tombstones its slot
//! rather than shifting the array, and `compact` reclaims the space during a
//! force reindex. All mutation goes through the exclusive write lock, so a
//! document's old chunk set and its replacement are swapped in one commit;
//! searches take the shared read lock and can run concurrently.

use super::persist::{self, IndexPaths, IndexSnapshot, MetadataSidecar};
use super::{ChunkRecord, DocumentRecord, Result, SimilarityMetric, StoreError, StoreStats};
use alcove_context::{ChunkId, TextChunk};
use chrono::{DateTime, Utc};
use half::f16;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Directory for the paired index files; `None` keeps the store purely
    /// in memory (persist and load become no-ops).
    pub index_dir: Option<PathBuf>,
    pub metric: SimilarityMetric,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            metric: SimilarityMetric::Cosine,
        }
    }
}

impl VectorStoreConfig {
    pub fn in_memory(metric: SimilarityMetric) -> Self {
        Self {
            index_dir: None,
            metric,
        }
    }

    pub fn on_disk(index_dir: impl Into<PathBuf>, metric: SimilarityMetric) -> Self {
        Self {
            index_dir: Some(index_dir.into()),
            metric,
        }
    }
}

/// One search result: the chunk's metadata plus its similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub score: f32,
}

struct Slot {
    id: ChunkId,
    vector: Vec<f16>,
    deleted: bool,
}

#[derive(Default)]
struct StoreInner {
    slots: Vec<Slot>,
    slot_of: HashMap<ChunkId, usize>,
    chunks: BTreeMap<ChunkId, ChunkRecord>,
    documents: BTreeMap<String, DocumentRecord>,
    /// 0 until the first upsert or load fixes it.
    dimension: usize,
    last_indexed: Option<DateTime<Utc>>,
}

impl StoreInner {
    fn tombstone(&mut self, id: &ChunkId) {
        if let Some(idx) = self.slot_of.remove(id) {
            self.slots[idx].deleted = true;
        }
        self.chunks.remove(id);
    }
}

pub struct VectorStore {
    inner: RwLock<StoreInner>,
    config: VectorStoreConfig,
}

impl VectorStore {
    pub fn new(config: VectorStoreConfig) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            config,
        }
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.config.metric
    }

    /// Replace `path`'s chunk set and document entry in one commit.
    ///
    /// Upserting an id that already exists replaces its vector in place, so
    /// repeated indexing of an unchanged document never duplicates entries.
    pub async fn upsert_document(
        &self,
        path: &str,
        content_hash: &str,
        size: u64,
        mtime_secs: i64,
        entries: Vec<(TextChunk, Vec<f32>)>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;

        if let Some((_, first)) = entries.first() {
            if inner.dimension == 0 {
                inner.dimension = first.len();
                debug!(dimension = inner.dimension, "store dimension fixed");
            }
        }
        for (_, vector) in &entries {
            if vector.len() != inner.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: inner.dimension,
                    actual: vector.len(),
                });
            }
        }

        let previous = inner.documents.get(path).cloned();
        if let Some(prev) = &previous {
            for id in &prev.chunk_ids {
                inner.tombstone(id);
            }
        }

        let mut chunk_ids = Vec::with_capacity(entries.len());
        for (chunk, vector) in entries {
            let encoded = encode_vector(self.config.metric, &vector);
            let idx = inner.slots.len();
            inner.slots.push(Slot {
                id: chunk.id.clone(),
                vector: encoded,
                deleted: false,
            });
            inner.slot_of.insert(chunk.id.clone(), idx);
            inner.chunks.insert(
                chunk.id.clone(),
                ChunkRecord {
                    id: chunk.id.clone(),
                    path: chunk.path,
                    content_hash: chunk.content_hash,
                    start: chunk.start,
                    end: chunk.end,
                    text: chunk.text,
                },
            );
            chunk_ids.push(chunk.id);
        }

        inner.documents.insert(
            path.to_string(),
            DocumentRecord {
                content_hash: content_hash.to_string(),
                size,
                mtime_secs,
                chunk_ids,
                version: previous.map(|p| p.version + 1).unwrap_or(1),
            },
        );
        inner.last_indexed = Some(Utc::now());
        Ok(())
    }

    /// Drop `path` and tombstone all of its chunks. Returns how many chunks
    /// were removed.
    pub async fn remove_document(&self, path: &str) -> usize {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.documents.remove(path) else {
            return 0;
        };
        for id in &record.chunk_ids {
            inner.tombstone(id);
        }
        inner.last_indexed = Some(Utc::now());
        record.chunk_ids.len()
    }

    /// Brute-force similarity scan over live slots. At most `k` hits, score
    /// descending, ties broken by ascending chunk id.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let inner = self.inner.read().await;
        if k == 0 || inner.chunks.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != inner.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: inner.dimension,
                actual: query.len(),
            });
        }

        let query = match self.config.metric {
            SimilarityMetric::Cosine => normalize(query),
            SimilarityMetric::InnerProduct => query.to_vec(),
        };

        let mut scored: Vec<(f32, &ChunkId)> = inner
            .slots
            .iter()
            .filter(|slot| !slot.deleted)
            .map(|slot| (dot(&slot.vector, &query), &slot.id))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .filter_map(|(score, id)| {
                inner
                    .chunks
                    .get(id)
                    .map(|chunk| SearchHit {
                        chunk: chunk.clone(),
                        score,
                    })
            })
            .collect())
    }

    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        StoreStats {
            document_count: inner.documents.len(),
            chunk_count: inner.chunks.len(),
            dimension: inner.dimension,
            last_indexed: inner.last_indexed,
        }
    }

    /// Snapshot of the document table, keyed by path. Input to the change
    /// scanner.
    pub async fn document_snapshot(&self) -> BTreeMap<String, DocumentRecord> {
        self.inner.read().await.documents.clone()
    }

    /// Drop tombstoned slots and rebuild the id index.
    pub async fn compact(&self) {
        let mut inner = self.inner.write().await;
        let before = inner.slots.len();
        inner.slots.retain(|slot| !slot.deleted);
        inner.slot_of = inner
            .slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| (slot.id.clone(), idx))
            .collect();
        debug!(before, after = inner.slots.len(), "compacted vector slots");
    }

    /// Drop everything, including the learned dimension.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = StoreInner::default();
    }

    /// Write the paired index files atomically. Only live entries are
    /// persisted, so tombstones never reach disk.
    pub async fn persist(&self) -> Result<()> {
        let Some(index_dir) = &self.config.index_dir else {
            return Ok(());
        };
        let paths = IndexPaths::new(index_dir);

        let (snapshot, sidecar) = {
            let inner = self.inner.read().await;
            let entries = inner
                .chunks
                .keys()
                .filter_map(|id| {
                    inner
                        .slot_of
                        .get(id)
                        .map(|&idx| (id.clone(), inner.slots[idx].vector.clone()))
                })
                .collect();
            (
                IndexSnapshot {
                    metric: self.config.metric,
                    dimension: inner.dimension,
                    entries,
                },
                MetadataSidecar {
                    format_version: 1,
                    documents: inner.documents.clone(),
                    chunks: inner.chunks.clone(),
                    last_indexed: inner.last_indexed,
                },
            )
        };

        let index_dir = index_dir.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&index_dir)?;
            persist::write_index(&paths.index, &snapshot)?;
            persist::write_sidecar(&paths.sidecar, &sidecar)
        })
        .await
        .map_err(|e| StoreError::Io {
            source: std::io::Error::other(e),
        })??;

        info!("index persisted");
        Ok(())
    }

    /// Load the paired index files, replacing the store contents. Returns
    /// `false` when no index exists yet. Any inconsistency between the two
    /// files surfaces as [`StoreError::Corruption`].
    pub async fn load(&self) -> Result<bool> {
        let Some(index_dir) = &self.config.index_dir else {
            return Ok(false);
        };
        let paths = IndexPaths::new(index_dir);
        if !paths.exist() {
            return Ok(false);
        }

        let metric = self.config.metric;
        let (snapshot, sidecar) = tokio::task::spawn_blocking(move || {
            let snapshot = persist::read_index(&paths.index)?;
            let sidecar = persist::read_sidecar(&paths.sidecar)?;
            Ok::<_, StoreError>((snapshot, sidecar))
        })
        .await
        .map_err(|e| StoreError::Io {
            source: std::io::Error::other(e),
        })??;

        if snapshot.metric != metric {
            return Err(StoreError::Corruption(format!(
                "index was built with a different similarity metric ({:?})",
                snapshot.metric
            )));
        }
        verify_consistency(&snapshot, &sidecar)?;

        let mut inner = self.inner.write().await;
        *inner = StoreInner::default();
        inner.dimension = snapshot.dimension;
        for (id, vector) in snapshot.entries {
            let idx = inner.slots.len();
            inner.slot_of.insert(id.clone(), idx);
            inner.slots.push(Slot {
                id,
                vector,
                deleted: false,
            });
        }
        inner.chunks = sidecar.chunks;
        inner.documents = sidecar.documents;
        inner.last_indexed = sidecar.last_indexed;

        info!(
            documents = inner.documents.len(),
            chunks = inner.chunks.len(),
            "index loaded"
        );
        Ok(true)
    }
}

/// The paired files must agree: vector ids, chunk table keys, and the union
/// of document chunk-id lists are all the same set.
fn verify_consistency(snapshot: &IndexSnapshot, sidecar: &MetadataSidecar) -> Result<()> {
    let vector_ids: BTreeSet<&ChunkId> = snapshot.entries.iter().map(|(id, _)| id).collect();
    let chunk_ids: BTreeSet<&ChunkId> = sidecar.chunks.keys().collect();
    if vector_ids != chunk_ids {
        return Err(StoreError::Corruption(
            "vector ids and chunk table disagree".into(),
        ));
    }
    let document_ids: BTreeSet<&ChunkId> = sidecar
        .documents
        .values()
        .flat_map(|d| d.chunk_ids.iter())
        .collect();
    if document_ids != chunk_ids {
        return Err(StoreError::Corruption(
            "document table and chunk table disagree".into(),
        ));
    }
    for (id, vector) in &snapshot.entries {
        if vector.len() != snapshot.dimension {
            return Err(StoreError::Corruption(format!(
                "vector for {id} has wrong dimension"
            )));
        }
    }
    Ok(())
}

fn encode_vector(metric: SimilarityMetric, vector: &[f32]) -> Vec<f16> {
    let normalized;
    let source = match metric {
        SimilarityMetric::Cosine => {
            normalized = normalize(vector);
            &normalized
        }
        SimilarityMetric::InnerProduct => vector,
    };
    source.iter().map(|&v| f16::from_f32(v)).collect()
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

fn dot(stored: &[f16], query: &[f32]) -> f32 {
    stored
        .iter()
        .zip(query)
        .map(|(s, q)| s.to_f32() * q)
        .sum()
}
