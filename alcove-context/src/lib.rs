//! alcove-context: document chunking for the Alcove indexing pipeline.

pub mod chunk;

pub use chunk::{ChunkId, ChunkingConfig, TextChunk, TextChunker};
