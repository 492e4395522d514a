//! Storage layer: the in-memory vector store and its on-disk format.
//!
//! The store keeps every live embedding in flat slots for brute-force
//! similarity scans, alongside two metadata tables: chunk id → chunk record,
//! and document path → document record. Durability is a pair of files under
//! the index directory: a checksummed binary file holding the vectors and a
//! JSON sidecar holding the tables.

use alcove_context::ChunkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod persist;
pub mod vector_store;

pub use vector_store::{SearchHit, VectorStore, VectorStoreConfig};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// How two vectors are compared during search. Chosen once per store; the
/// choice is recorded in the index file and enforced on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine similarity; vectors are L2-normalized at insert time so the
    /// scan itself is a plain dot product.
    Cosine,
    /// Raw inner product over the stored vectors.
    InnerProduct,
}

impl SimilarityMetric {
    pub(crate) fn as_tag(self) -> u8 {
        match self {
            Self::Cosine => 0,
            Self::InnerProduct => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Cosine),
            1 => Ok(Self::InnerProduct),
            other => Err(StoreError::Corruption(format!(
                "unknown similarity tag {other}"
            ))),
        }
    }
}

/// Metadata for one indexed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    /// Path of the owning document, relative to the document root.
    pub path: String,
    /// Hex blake3 digest of the chunk text.
    pub content_hash: String,
    /// Character span within the source document.
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Document table entry: everything needed to decide, next run, whether the
/// file changed, plus the ids of the chunks it currently owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Hex blake3 digest of the full file content.
    pub content_hash: String,
    pub size: u64,
    /// Last-modified time in seconds since the Unix epoch, for the cheap
    /// pre-filter that short-circuits hashing.
    pub mtime_secs: i64,
    pub chunk_ids: Vec<ChunkId>,
    /// Incremented each time this document's chunk set is replaced.
    pub version: u64,
}

/// Store-level counters reported by `stats` commands.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub dimension: usize,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// Error conditions raised by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persisted files are damaged or inconsistent with each other. The
    /// caller's recovery path is a full reindex from scratch.
    #[error("index corruption: {0}")]
    Corruption(String),

    /// An inserted or queried vector does not match the store dimension.
    #[error("vector dimension mismatch: store holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index I/O failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("metadata encoding failed: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}
