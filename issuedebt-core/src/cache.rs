//! On-disk cache of normalized records
//!
//! The cache is a single JSON snapshot holding every known record, keyed
//! by id. It can always be rebuilt by re-fetching, so a missing file is an
//! empty cache rather than an error.
//!
//! Refreshes merge by id: fetched records overwrite cached ones, and cached
//! records missing from a (possibly partial) fetch are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::IssueRecord;

/// Snapshot format version written by this build
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    refreshed_at: DateTime<Utc>,
    records: Vec<IssueRecord>,
}

/// Counts from a merge
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    /// Ids not previously cached
    pub inserted: usize,
    /// Cached ids whose record changed
    pub updated: usize,
    /// Cached ids fetched again without changes
    pub unchanged: usize,
    /// Records in the cache after the merge
    pub total: usize,
}

/// JSON snapshot store for [`IssueRecord`]s.
///
/// Single writer, single reader per process.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Store backed by the snapshot at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load every cached record, sorted by id.
    ///
    /// A missing snapshot is an empty cache. A snapshot that cannot be parsed
    /// yields [`Error::CacheUnavailable`].
    pub fn load(&self) -> Result<Vec<IssueRecord>> {
        Ok(self.load_map()?.into_values().collect())
    }

    /// Upsert `records` by id and persist the result.
    ///
    /// Within one batch the last record for an id wins.
    pub fn merge(&self, records: impl IntoIterator<Item = IssueRecord>) -> Result<MergeSummary> {
        let mut cached = self.load_map()?;
        let mut summary = MergeSummary::default();

        let incoming: BTreeMap<u64, IssueRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();
        let fetched = incoming.len();

        for (id, record) in incoming {
            match cached.insert(id, record) {
                None => summary.inserted += 1,
                Some(previous) if Some(&previous) == cached.get(&id) => summary.unchanged += 1,
                Some(_) => summary.updated += 1,
            }
        }
        summary.total = cached.len();

        self.write(cached.into_values().collect())?;

        tracing::info!(
            path = %self.path.display(),
            fetched,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            total = summary.total,
            "Merged records into cache"
        );
        Ok(summary)
    }

    /// Remove the snapshot entirely.
    pub fn flush(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Cache flushed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load_map(&self) -> Result<BTreeMap<u64, IssueRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No cache snapshot, starting empty");
                return Ok(BTreeMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|e| self.unavailable(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(self.unavailable(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        tracing::debug!(
            path = %self.path.display(),
            records = snapshot.records.len(),
            refreshed_at = %snapshot.refreshed_at,
            "Loaded cache snapshot"
        );

        Ok(snapshot.records.into_iter().map(|r| (r.id, r)).collect())
    }

    /// Write to a sibling temp file, then rename over the snapshot.
    fn write(&self, records: Vec<IssueRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            refreshed_at: Utc::now(),
            records,
        };

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            serde_json::to_writer_pretty(&mut file, &snapshot)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn unavailable(&self, reason: String) -> Error {
        Error::CacheUnavailable {
            path: self.path.clone(),
            reason,
        }
    }
}
