//! Overlapping character-window chunking.
//!
//! Documents are split into fixed-size windows of `chunk_size` characters,
//! each window advancing `chunk_size - overlap` characters past the previous
//! one; the final window may be shorter. The policy is deliberately raw
//! character windows (no sentence or word snapping): identical
//! `(text, chunk_size, overlap)` inputs always produce identical boundaries,
//! and chunk ids are a pure function of `(document path, window index)`, so
//! re-chunking an unmodified document reproduces the exact same ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a chunk, derived from its document path and window
/// index. Formatted as `"{path}#{window:05}"` so that lexicographic ordering
/// of ids matches `(path, window)` ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(path: &str, window: usize) -> Self {
        Self(format!("{path}#{window:05}"))
    }

    /// Reconstruct an id from its persisted string form.
    pub fn parse(raw: &str) -> Self {
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The document path portion of the id.
    pub fn document_path(&self) -> &str {
        self.0.rsplit_once('#').map(|(p, _)| p).unwrap_or(&self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chunking parameters: window size and overlap, both in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size S in characters.
    pub chunk_size: usize,
    /// Overlap O in characters; each window advances `S - O` positions.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Create a config, validating `0 <= overlap < chunk_size` and
    /// `chunk_size > 0`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, String> {
        if chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }
        if overlap >= chunk_size {
            return Err(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            ));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// How far each window advances, in characters.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// A contiguous span of a document's text: the atomic unit of embedding and
/// retrieval. Offsets are character offsets into the source text. Chunks are
/// immutable once created; a change to the source document invalidates and
/// replaces all of that document's chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: ChunkId,
    /// Path of the owning document, relative to the document root.
    pub path: String,
    /// Window index within the document (0-based).
    pub sequence: usize,
    /// Start character offset of the span.
    pub start: usize,
    /// End character offset of the span (exclusive).
    pub end: usize,
    /// The span text itself.
    pub text: String,
    /// Character count of the span.
    pub char_count: usize,
    /// Hex-encoded blake3 digest of the span bytes.
    pub content_hash: String,
}

/// Splits document text into [`TextChunk`]s under a [`ChunkingConfig`].
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkingConfig,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into ordered, overlapping chunks covering the whole text.
    ///
    /// Empty input produces no chunks. The final chunk may be shorter than
    /// the configured window size.
    pub fn chunk(&self, path: &str, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, plus the end of the text, so
        // windows measured in chars can be sliced without splitting a
        // codepoint.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        let total_chars = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.config.chunk_size).min(total_chars);
            let span = &text[boundaries[start]..boundaries[end]];
            let sequence = chunks.len();
            chunks.push(TextChunk {
                id: ChunkId::new(path, sequence),
                path: path.to_string(),
                sequence,
                start,
                end,
                text: span.to_string(),
                char_count: end - start,
                content_hash: blake3::hash(span.as_bytes()).to_hex().to_string(),
            });

            if end == total_chars {
                break;
            }
            start += self.config.stride();
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> TextChunker {
        TextChunker::new(ChunkingConfig::new(size, overlap).unwrap())
    }

    #[test]
    fn window_offsets_match_size_and_overlap() {
        let text = "a".repeat(1000);
        let chunks = chunker(512, 50).chunk("doc1.txt", &text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.start).collect::<Vec<_>>(),
            vec![0, 462, 924]
        );
        assert_eq!(chunks[0].end, 512);
        assert_eq!(chunks[1].end, 974);
        assert_eq!(chunks[2].end, 1000);
        assert_eq!(chunks[2].char_count, 76);
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let text = "b".repeat(300);
        let chunks = chunker(512, 50).chunk("doc2.txt", &text);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 300);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunker(512, 50).chunk("empty.txt", "").is_empty());
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let a = chunker(128, 16).chunk("notes.md", &text);
        let b = chunker(128, 16).chunk("notes.md", &text);
        assert_eq!(a, b);
    }

    #[test]
    fn ids_are_stable_and_ordered() {
        let text = "x".repeat(700);
        let chunks = chunker(256, 32).chunk("dir/file.txt", &text);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, ChunkId::new("dir/file.txt", i));
            assert_eq!(chunk.id.document_path(), "dir/file.txt");
        }
        let mut ids: Vec<_> = chunks.iter().map(|c| c.id.clone()).collect();
        let sorted = {
            let mut s = ids.clone();
            s.sort();
            s
        };
        assert_eq!(ids, sorted);
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld ünïcode ".repeat(50);
        let chunks = chunker(100, 10).chunk("utf8.txt", &text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.text.chars().count(), chunk.char_count);
        }
    }

    #[test]
    fn span_hash_tracks_content() {
        let a = chunker(512, 0).chunk("a.txt", "same text");
        let b = chunker(512, 0).chunk("b.txt", "same text");
        let c = chunker(512, 0).chunk("a.txt", "different text");

        assert_eq!(a[0].content_hash, b[0].content_hash);
        assert_ne!(a[0].content_hash, c[0].content_hash);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(100, 100).is_err());
        assert!(ChunkingConfig::new(100, 150).is_err());
        assert!(ChunkingConfig::new(100, 99).is_ok());
    }
}
