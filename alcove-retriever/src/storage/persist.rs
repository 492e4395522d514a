//! On-disk index format: a checksummed binary vector file plus a JSON
//! metadata sidecar.
//!
//! Binary layout (all integers little-endian):
//!
//! ```text
//! magic "ALCV" | format version u32 | metric u8 | dimension u32 | count u64
//! then per entry: id length u32 | id bytes (utf-8) | dimension f16 values
//! then: blake3 checksum of everything above (32 bytes)
//! ```
//!
//! Both files are written atomically: full contents to a temp file in the
//! same directory, fsync, rename over the target. A reader therefore sees
//! either the previous complete pair or the new one, never a torn file.

use super::{ChunkRecord, DocumentRecord, Result, SimilarityMetric, StoreError};
use alcove_context::ChunkId;
use chrono::{DateTime, Utc};
use half::f16;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"ALCV";
const FORMAT_VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 32;

/// Locations of the paired files under an index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub sidecar: PathBuf,
}

impl IndexPaths {
    pub fn new(index_dir: &Path) -> Self {
        Self {
            index: index_dir.join("alcove.index"),
            sidecar: index_dir.join("alcove.meta.json"),
        }
    }

    pub fn exist(&self) -> bool {
        self.index.exists() && self.sidecar.exists()
    }
}

/// The vector half of the store, as written to the binary file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub metric: SimilarityMetric,
    pub dimension: usize,
    /// Live entries only, in ascending id order.
    pub entries: Vec<(ChunkId, Vec<f16>)>,
}

/// The metadata half of the store, as written to the JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSidecar {
    pub format_version: u32,
    pub documents: BTreeMap<String, DocumentRecord>,
    pub chunks: BTreeMap<ChunkId, ChunkRecord>,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// Serialize and atomically write the binary index file.
pub fn write_index(path: &Path, snapshot: &IndexSnapshot) -> Result<()> {
    let mut buf = Vec::with_capacity(
        24 + snapshot
            .entries
            .iter()
            .map(|(id, v)| 4 + id.as_str().len() + v.len() * 2)
            .sum::<usize>(),
    );
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.push(snapshot.metric.as_tag());
    buf.extend_from_slice(&(snapshot.dimension as u32).to_le_bytes());
    buf.extend_from_slice(&(snapshot.entries.len() as u64).to_le_bytes());

    for (id, vector) in &snapshot.entries {
        let id_bytes = id.as_str().as_bytes();
        buf.extend_from_slice(&(id_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(id_bytes);
        buf.extend_from_slice(bytemuck::cast_slice::<f16, u8>(vector));
    }

    let checksum = blake3::hash(&buf);
    buf.extend_from_slice(checksum.as_bytes());

    write_atomic(path, &buf)
}

/// Read and verify the binary index file.
pub fn read_index(path: &Path) -> Result<IndexSnapshot> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < MAGIC.len() + CHECKSUM_LEN {
        return Err(StoreError::Corruption("index file too short".into()));
    }

    let (body, stored) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let computed = blake3::hash(body);
    if computed.as_bytes() != stored {
        return Err(StoreError::Corruption("index checksum mismatch".into()));
    }

    let mut reader = Reader { bytes: body, pos: 0 };
    if reader.take(4)? != MAGIC {
        return Err(StoreError::Corruption("bad index magic".into()));
    }
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(StoreError::Corruption(format!(
            "unsupported index format version {version}"
        )));
    }
    let metric = SimilarityMetric::from_tag(reader.u8()?)?;
    let dimension = reader.u32()? as usize;
    let count = reader.u64()? as usize;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let id_len = reader.u32()? as usize;
        let id_bytes = reader.take(id_len)?;
        let id_str = std::str::from_utf8(id_bytes)
            .map_err(|_| StoreError::Corruption("chunk id is not utf-8".into()))?;
        let vector_bytes = reader.take(dimension * 2)?;
        // pod_collect_to_vec copies, so the source alignment does not matter.
        let vector: Vec<f16> = bytemuck::pod_collect_to_vec(vector_bytes);
        entries.push((ChunkId::parse(id_str), vector));
    }
    if reader.pos != body.len() {
        return Err(StoreError::Corruption("trailing bytes in index file".into()));
    }

    Ok(IndexSnapshot {
        metric,
        dimension,
        entries,
    })
}

/// Serialize and atomically write the JSON sidecar.
pub fn write_sidecar(path: &Path, sidecar: &MetadataSidecar) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(sidecar)?;
    write_atomic(path, &bytes)
}

/// Read and validate the JSON sidecar.
pub fn read_sidecar(path: &Path) -> Result<MetadataSidecar> {
    let bytes = std::fs::read(path)?;
    let sidecar: MetadataSidecar = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Corruption(format!("sidecar does not parse: {e}")))?;
    if sidecar.format_version != FORMAT_VERSION {
        return Err(StoreError::Corruption(format!(
            "unsupported sidecar format version {}",
            sidecar.format_version
        )));
    }
    Ok(sidecar)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| StoreError::Corruption("truncated index file".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> IndexSnapshot {
        IndexSnapshot {
            metric: SimilarityMetric::Cosine,
            dimension: 4,
            entries: vec![
                (
                    ChunkId::new("a.txt", 0),
                    vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3), f16::from_f32(0.4)],
                ),
                (
                    ChunkId::new("b.md", 0),
                    vec![f16::from_f32(-1.0), f16::from_f32(0.0), f16::from_f32(0.5), f16::from_f32(1.0)],
                ),
            ],
        }
    }

    #[test]
    fn index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alcove.index");
        let snapshot = sample_snapshot();

        write_index(&path, &snapshot).unwrap();
        let loaded = read_index(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alcove.index");
        write_index(&path, &sample_snapshot()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(read_index(&path), Err(StoreError::Corruption(_))));
    }

    #[test]
    fn truncated_file_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alcove.index");
        write_index(&path, &sample_snapshot()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..10]).unwrap();

        assert!(matches!(read_index(&path), Err(StoreError::Corruption(_))));
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alcove.meta.json");

        let id = ChunkId::new("a.txt", 0);
        let mut chunks = BTreeMap::new();
        chunks.insert(
            id.clone(),
            ChunkRecord {
                id: id.clone(),
                path: "a.txt".into(),
                content_hash: "deadbeef".into(),
                start: 0,
                end: 9,
                text: "some text".into(),
            },
        );
        let mut documents = BTreeMap::new();
        documents.insert(
            "a.txt".to_string(),
            DocumentRecord {
                content_hash: "cafe".into(),
                size: 9,
                mtime_secs: 1_700_000_000,
                chunk_ids: vec![id],
                version: 1,
            },
        );
        let sidecar = MetadataSidecar {
            format_version: 1,
            documents,
            chunks,
            last_indexed: Some(Utc::now()),
        };

        write_sidecar(&path, &sidecar).unwrap();
        let loaded = read_sidecar(&path).unwrap();
        assert_eq!(loaded, sidecar);
    }

    #[test]
    fn garbage_sidecar_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alcove.meta.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(read_sidecar(&path), Err(StoreError::Corruption(_))));
    }
}
