//! alcove-retriever: incremental document indexing and vector retrieval.
//!
//! This crate turns a folder of documents into a searchable vector index and
//! keeps that index current across runs, re-embedding only what changed.
//!
//! ## Key modules
//!
//! - **[`retrieval`]**: change scanning, the indexing engine, and the
//!   retrieval planner
//! - **[`storage`]**: the in-memory vector store and its paired-file
//!   persistence
//!
//! ## Architecture
//!
//! ```text
//! Files → ChangeScanner → TextChunker → EmbeddingProvider → VectorStore
//!                              ↑                                ↓
//!                        IndexingEngine                  RetrievalPlanner
//! ```

pub mod retrieval;
pub mod storage;
