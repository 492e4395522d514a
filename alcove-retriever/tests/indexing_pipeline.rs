//! End-to-end indexing pipeline tests: scan, chunk, embed, store, persist.

use alcove_context::ChunkingConfig;
use alcove_embed::{EmbeddingProvider, EmbeddingResult};
use alcove_retriever::retrieval::indexing_engine::{IndexingEngine, IndexingEngineConfig};
use alcove_retriever::retrieval::planner::{RetrievalConfig, RetrievalPlanner};
use alcove_retriever::storage::{SimilarityMetric, VectorStore, VectorStoreConfig};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Deterministic stand-in for a real embedding model: vectors derived from
/// the text digest, so equal text always embeds identically.
struct DigestProvider;

fn digest_vector(text: &str) -> Vec<f32> {
    let hash = blake3::hash(text.as_bytes());
    hash.as_bytes()[..16]
        .iter()
        .map(|&b| b as f32 / 255.0 + 0.01)
        .collect()
}

#[async_trait]
impl EmbeddingProvider for DigestProvider {
    async fn embed_texts(&self, texts: &[String]) -> alcove_embed::Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| digest_vector(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        16
    }

    fn model_id(&self) -> String {
        "test/digest".into()
    }
}

fn engine(root: &Path, index_dir: Option<&Path>, workers: usize) -> IndexingEngine {
    let store_config = match index_dir {
        Some(dir) => VectorStoreConfig::on_disk(dir, SimilarityMetric::Cosine),
        None => VectorStoreConfig::in_memory(SimilarityMetric::Cosine),
    };
    let config = IndexingEngineConfig::new(root)
        .with_chunking(ChunkingConfig::new(512, 50).unwrap())
        .with_max_workers(workers);
    IndexingEngine::new(
        config,
        Arc::new(VectorStore::new(store_config)),
        Arc::new(DigestProvider),
    )
}

async fn live_ids(store: &VectorStore) -> BTreeSet<String> {
    store
        .document_snapshot()
        .await
        .values()
        .flat_map(|d| d.chunk_ids.iter().map(|id| id.as_str().to_string()))
        .collect()
}

#[tokio::test]
async fn two_documents_chunk_counts_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("doc1.txt"), "a".repeat(1000)).unwrap();
    std::fs::write(dir.path().join("doc2.txt"), "b".repeat(300)).unwrap();

    let engine = engine(dir.path(), None, 2);
    let report = engine.reindex(false).await.unwrap();

    assert_eq!(report.new, 2);
    assert_eq!(report.chunk_count, 4);
    let stats = engine.store().stats().await;
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.chunk_count, 4);

    let snapshot = engine.store().document_snapshot().await;
    assert_eq!(snapshot["doc1.txt"].chunk_ids.len(), 3);
    assert_eq!(snapshot["doc2.txt"].chunk_ids.len(), 1);
}

#[tokio::test]
async fn reindexing_unchanged_root_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "alpha document body").unwrap();
    std::fs::write(root.path().join("b.md"), "beta document body").unwrap();

    let engine = engine(root.path(), Some(index.path()), 4);
    engine.reindex(false).await.unwrap();
    let first_docs = engine.store().document_snapshot().await;
    let first_ids = live_ids(&engine.store()).await;
    let first_sidecar = std::fs::read(index.path().join("alcove.meta.json")).unwrap();

    let second = engine.reindex(false).await.unwrap();
    assert_eq!(second.new, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 2);
    assert_eq!(engine.store().document_snapshot().await, first_docs);
    assert_eq!(live_ids(&engine.store()).await, first_ids);
    // persisted metadata is byte-identical across no-op runs
    let second_sidecar = std::fs::read(index.path().join("alcove.meta.json")).unwrap();
    assert_eq!(first_sidecar, second_sidecar);
}

#[tokio::test]
async fn one_byte_change_replaces_only_that_document() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "a".repeat(600)).unwrap();
    std::fs::write(root.path().join("b.txt"), "b".repeat(600)).unwrap();

    let engine = engine(root.path(), None, 2);
    engine.reindex(false).await.unwrap();
    let before = engine.store().document_snapshot().await;

    let mut changed = "a".repeat(600);
    changed.push('z');
    std::fs::write(root.path().join("a.txt"), changed).unwrap();

    let report = engine.reindex(false).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);

    let after = engine.store().document_snapshot().await;
    assert_eq!(after["b.txt"], before["b.txt"]);
    assert_eq!(after["a.txt"].version, before["a.txt"].version + 1);
    assert_ne!(after["a.txt"].content_hash, before["a.txt"].content_hash);
    // same window ids, new content behind them
    assert_eq!(after["a.txt"].chunk_ids, before["a.txt"].chunk_ids);
}

#[tokio::test]
async fn deleting_a_file_removes_exactly_its_chunks() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("keep.txt"), "k".repeat(300)).unwrap();
    std::fs::write(root.path().join("gone.txt"), "g".repeat(1000)).unwrap();

    let engine = engine(root.path(), None, 2);
    engine.reindex(false).await.unwrap();
    let before = engine.store().stats().await;
    assert_eq!(before.chunk_count, 4);

    std::fs::remove_file(root.path().join("gone.txt")).unwrap();
    let report = engine.reindex(false).await.unwrap();
    assert_eq!(report.removed, 1);

    let after = engine.store().stats().await;
    assert_eq!(after.document_count, 1);
    assert_eq!(after.chunk_count, 1);
    let ids = live_ids(&engine.store()).await;
    assert!(ids.iter().all(|id| id.starts_with("keep.txt#")));
}

#[tokio::test]
async fn final_state_is_independent_of_worker_count() {
    let root = tempfile::tempdir().unwrap();
    for i in 0..12 {
        std::fs::write(
            root.path().join(format!("doc{i:02}.txt")),
            format!("document number {i} ").repeat(40),
        )
        .unwrap();
    }

    let solo = engine(root.path(), None, 1);
    solo.reindex(false).await.unwrap();
    let solo_ids = live_ids(&solo.store()).await;

    let pooled = engine(root.path(), None, 8);
    pooled.reindex(false).await.unwrap();
    let pooled_ids = live_ids(&pooled.store()).await;

    assert_eq!(solo_ids, pooled_ids);
    assert_eq!(
        solo.store().document_snapshot().await,
        pooled.store().document_snapshot().await
    );
}

#[tokio::test]
async fn index_survives_restart_via_paired_files() {
    let root = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "persistent content here").unwrap();

    let first = engine(root.path(), Some(index.path()), 2);
    first.reindex(false).await.unwrap();
    let ids = live_ids(&first.store()).await;
    drop(first);

    // fresh engine, same index directory: load instead of re-embed
    let second = engine(root.path(), Some(index.path()), 2);
    let report = second.reindex(false).await.unwrap();
    assert_eq!(report.new, 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(live_ids(&second.store()).await, ids);
}

#[tokio::test]
async fn corrupted_index_falls_back_to_full_rebuild() {
    let root = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "content worth keeping").unwrap();

    let first = engine(root.path(), Some(index.path()), 2);
    first.reindex(false).await.unwrap();
    drop(first);

    let index_file = index.path().join("alcove.index");
    let mut bytes = std::fs::read(&index_file).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x42;
    std::fs::write(&index_file, bytes).unwrap();

    let second = engine(root.path(), Some(index.path()), 2);
    let report = second.reindex(false).await.unwrap();
    assert_eq!(report.new, 1);
    assert_eq!(second.store().stats().await.chunk_count, 1);
}

#[tokio::test]
async fn force_reindex_rebuilds_everything() {
    let root = tempfile::tempdir().unwrap();
    let index = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "first file").unwrap();
    std::fs::write(root.path().join("b.txt"), "second file").unwrap();

    let engine = engine(root.path(), Some(index.path()), 2);
    engine.reindex(false).await.unwrap();

    let report = engine.reindex(true).await.unwrap();
    assert_eq!(report.new, 2);
    assert_eq!(report.unchanged, 0);
    assert_eq!(engine.store().stats().await.document_count, 2);
}

#[tokio::test]
async fn retrieval_finds_the_matching_document() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("a.txt"), "the mitochondria is the powerhouse").unwrap();
    std::fs::write(root.path().join("b.txt"), "completely unrelated gardening notes").unwrap();

    let engine = engine(root.path(), None, 2);
    engine.reindex(false).await.unwrap();

    let planner = RetrievalPlanner::new(
        engine.store(),
        Arc::new(DigestProvider),
        RetrievalConfig {
            top_k: 1,
            min_score: None,
            per_doc_cap: 0,
        },
    );
    // identical text embeds identically under the digest provider, so the
    // exact chunk text is the nearest neighbor of itself
    let results = planner
        .retrieve("the mitochondria is the powerhouse")
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].path, "a.txt");
}
