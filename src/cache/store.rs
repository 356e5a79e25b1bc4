//! Content-addressed cache record store
//!
//! Maps layer content digests to previously produced artifact references.
//! Records are JSON lines appended after each successful assembly; the
//! file is read once into an immutable snapshot during planning, so
//! concurrent builds never observe a half-written entry.

use crate::error::{StratumError, StratumResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// One cache record: a layer digest and the artifact it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Layer content digest (full hex)
    pub digest: String,

    /// Backend artifact reference (e.g. staged layer directory)
    pub artifact: String,

    /// When the artifact was produced
    pub created_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Create a record stamped with the current time
    pub fn new(digest: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            artifact: artifact.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only store of cache records.
///
/// Duplicate digests are allowed on disk; the latest line wins on load.
/// Corrupt lines are skipped with a warning, never fatal.
pub struct CacheStore {
    path: PathBuf,
    records: HashMap<String, CacheRecord>,
}

impl CacheStore {
    /// Open a store, loading the snapshot from disk.
    ///
    /// A missing file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> StratumResult<Self> {
        let path = path.into();
        let mut records = HashMap::new();

        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                StratumError::CacheRecordsRead {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;

            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<CacheRecord>(line) {
                    Ok(record) => {
                        records.insert(record.digest.clone(), record);
                    }
                    Err(e) => warn!("Skipping corrupt cache record: {}", e),
                }
            }
        }

        debug!("Loaded {} cache records from {}", records.len(), path.display());
        Ok(Self { path, records })
    }

    /// Look up a record by layer digest
    pub fn get(&self, digest: &str) -> Option<&CacheRecord> {
        self.records.get(digest)
    }

    /// Whether a digest has a cached artifact
    pub fn contains(&self, digest: &str) -> bool {
        self.records.contains_key(digest)
    }

    /// Number of records in the snapshot
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, sorted by creation time (newest first)
    pub fn records(&self) -> Vec<&CacheRecord> {
        let mut all: Vec<&CacheRecord> = self.records.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and add it to the snapshot.
    ///
    /// The write is a single O_APPEND line, so readers see either the
    /// whole record or nothing.
    pub async fn append(&mut self, record: CacheRecord) -> StratumResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StratumError::io("creating cache records directory", e))?;
        }

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                StratumError::io(format!("opening cache records {}", self.path.display()), e)
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StratumError::io("appending cache record", e))?;
        file.flush()
            .await
            .map_err(|e| StratumError::io("flushing cache records", e))?;

        self.records.insert(record.digest.clone(), record);
        Ok(())
    }

    /// Rewrite the store keeping only records the predicate accepts.
    ///
    /// Maintenance operation (gc); planning only ever reads a snapshot.
    /// Writes a fresh file and renames it over the old one.
    pub async fn compact<F>(&mut self, retain: F) -> StratumResult<usize>
    where
        F: Fn(&CacheRecord) -> bool,
    {
        let before = self.records.len();
        self.records.retain(|_, r| retain(r));

        let mut kept: Vec<&CacheRecord> = self.records.values().collect();
        kept.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut content = String::new();
        for record in kept {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StratumError::io("creating cache records directory", e))?;
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StratumError::io("writing compacted cache records", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StratumError::io("replacing cache records", e))?;

        Ok(before - self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::open(temp.path().join("records.jsonl"))
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn append_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("records.jsonl");

        let mut store = CacheStore::open(&path).await.unwrap();
        store
            .append(CacheRecord::new("digest-a", "/artifacts/a"))
            .await
            .unwrap();
        store
            .append(CacheRecord::new("digest-b", "/artifacts/b"))
            .await
            .unwrap();

        let reloaded = CacheStore::open(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("digest-a"));
        assert_eq!(reloaded.get("digest-b").unwrap().artifact, "/artifacts/b");
    }

    #[tokio::test]
    async fn latest_duplicate_wins() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("records.jsonl");

        let mut store = CacheStore::open(&path).await.unwrap();
        store
            .append(CacheRecord::new("digest-a", "/old"))
            .await
            .unwrap();
        store
            .append(CacheRecord::new("digest-a", "/new"))
            .await
            .unwrap();

        let reloaded = CacheStore::open(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("digest-a").unwrap().artifact, "/new");
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("records.jsonl");

        let mut store = CacheStore::open(&path).await.unwrap();
        store
            .append(CacheRecord::new("digest-a", "/a"))
            .await
            .unwrap();

        // Simulate a truncated write from a crashed process
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"digest\": \"digest-b\", \"arti");
        std::fs::write(&path, content).unwrap();

        let reloaded = CacheStore::open(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("digest-a"));
    }

    #[tokio::test]
    async fn compact_drops_rejected_records() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("records.jsonl");

        let mut store = CacheStore::open(&path).await.unwrap();
        store.append(CacheRecord::new("keep", "/k")).await.unwrap();
        store.append(CacheRecord::new("drop", "/d")).await.unwrap();

        let removed = store.compact(|r| r.digest == "keep").await.unwrap();
        assert_eq!(removed, 1);

        let reloaded = CacheStore::open(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("keep"));
        assert!(!reloaded.contains("drop"));
    }

    #[tokio::test]
    async fn records_sorted_newest_first() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("records.jsonl");

        let mut store = CacheStore::open(&path).await.unwrap();
        let mut old = CacheRecord::new("old", "/old");
        old.created_at = Utc::now() - chrono::Duration::days(2);
        store.append(old).await.unwrap();
        store.append(CacheRecord::new("new", "/new")).await.unwrap();

        let records = store.records();
        assert_eq!(records[0].digest, "new");
        assert_eq!(records[1].digest, "old");
    }
}
