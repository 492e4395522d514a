//! Change detection: compare the document root against the persisted
//! document table and classify every file.
//!
//! Classification is content-based (blake3), with a size+mtime equality
//! check against the stored entry short-circuiting the hash for files that
//! obviously have not moved. Scan errors never abort the walk; problem
//! files land in the `skipped` list with a reason and a warning.

use crate::storage::DocumentRecord;
use ignore::WalkBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;

/// File extensions eligible for indexing. Everything else is ignored
/// outright, not even reported as skipped.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rs", "py", "js", "ts", "json", "csv", "html", "xml", "toml", "yaml",
];

/// Outcome of one scan: four disjoint path-sorted sets plus skip
/// diagnostics. Paths are relative to the document root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
    pub skipped: Vec<(String, String)>,
}

impl ChangeSet {
    /// Whether anything needs indexing work.
    pub fn is_settled(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChangeScanner {
    root: PathBuf,
}

impl ChangeScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Walk the root and classify every supported file against `known`.
    /// Blocking; run under `spawn_blocking` from async contexts.
    pub fn scan(&self, known: &BTreeMap<String, DocumentRecord>) -> ChangeSet {
        let mut set = ChangeSet::default();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for entry in WalkBuilder::new(&self.root).build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "walk error, continuing scan");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if !Self::is_supported(path) {
                continue;
            }
            let rel = match path.strip_prefix(&self.root) {
                Ok(rel) => rel.to_string_lossy().into_owned(),
                Err(_) => continue,
            };
            seen.insert(rel.clone());

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %rel, error = %e, "cannot stat file, skipping");
                    set.skipped.push((rel, format!("stat failed: {e}")));
                    continue;
                }
            };

            match known.get(&rel) {
                None => set.new.push(rel),
                Some(record)
                    if record.size == meta.len() && record.mtime_secs == mtime_secs(&meta) =>
                {
                    set.unchanged.push(rel)
                }
                Some(record) => match hash_file(path) {
                    Ok(hash) if hash == record.content_hash => set.unchanged.push(rel),
                    Ok(_) => set.modified.push(rel),
                    Err(e) => {
                        warn!(path = %rel, error = %e, "cannot read file, skipping");
                        set.skipped.push((rel, format!("read failed: {e}")));
                    }
                },
            }
        }

        set.removed = known
            .keys()
            .filter(|path| !seen.contains(*path))
            .cloned()
            .collect();

        set.new.sort();
        set.modified.sort();
        set.unchanged.sort();
        set.skipped.sort();
        // removed comes from a BTreeMap, already sorted
        set
    }
}

pub(crate) fn mtime_secs(meta: &Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
