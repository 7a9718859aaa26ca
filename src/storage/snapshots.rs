//! Snapshot directory access.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::{Snapshot, parse_snapshot_file_name, snapshot_file_name};
use crate::utils::fs::with_suffix;

/// Suffix given to snapshots the parser refused.
pub const REJECTED_SUFFIX: &str = ".rejected";

/// Suffix of in-progress downloads.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Extension of the link document kept for expiry sources.
pub const DOCUMENT_EXTENSION: &str = "json";

/// Lists and names the snapshot files of every source.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a snapshot of `source_id` taken at `fetched_at`.
    pub fn path_for(&self, source_id: &str, fetched_at: DateTime<Utc>) -> PathBuf {
        self.dir.join(snapshot_file_name(source_id, fetched_at))
    }

    /// Path of the link document of an expiry source.
    pub fn document_path(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("{source_id}.{DOCUMENT_EXTENSION}"))
    }

    /// The stored link document of `source_id`, dated by its modification time.
    pub async fn document(&self, source_id: &str) -> std::io::Result<Option<Snapshot>> {
        let path = self.document_path(source_id);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let fetched_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Some(Snapshot {
            source_id: source_id.to_string(),
            fetched_at,
            size: metadata.len(),
            path,
        }))
    }

    /// Snapshots of one source, oldest first by embedded timestamp.
    pub async fn list(&self, source_id: &str) -> std::io::Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|s| s.source_id == source_id)
            .collect();
        snapshots.sort_by(|a, b| a.fetched_at.cmp(&b.fetched_at).then_with(|| a.path.cmp(&b.path)));
        Ok(snapshots)
    }

    /// The current snapshot of a source: the one with the newest timestamp.
    pub async fn latest(&self, source_id: &str) -> std::io::Result<Option<Snapshot>> {
        Ok(self.list(source_id).await?.pop())
    }

    /// Every file in the directory that follows the snapshot naming scheme.
    pub async fn list_all(&self) -> std::io::Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        for (path, name) in self.file_names().await? {
            let Some((source_id, fetched_at)) = parse_snapshot_file_name(&name) else {
                continue;
            };
            let size = tokio::fs::metadata(&path).await?.len();
            snapshots.push(Snapshot {
                source_id,
                fetched_at,
                path,
                size,
            });
        }
        snapshots.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then_with(|| a.fetched_at.cmp(&b.fetched_at))
        });
        Ok(snapshots)
    }

    /// Leftover temp and rejected files belonging to a source.
    pub async fn leftovers(&self, source_id: &str) -> std::io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for (path, name) in self.file_names().await? {
            let base = name
                .strip_suffix(TEMP_SUFFIX)
                .or_else(|| name.strip_suffix(REJECTED_SUFFIX));
            let belongs = base
                .and_then(parse_snapshot_file_name)
                .is_some_and(|(id, _)| id == source_id);
            if belongs {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Move a snapshot aside so it is no longer listed.
    pub async fn reject(&self, snapshot: &Snapshot) -> std::io::Result<PathBuf> {
        let target = with_suffix(&snapshot.path, REJECTED_SUFFIX);
        tokio::fs::rename(&snapshot.path, &target).await?;
        Ok(target)
    }

    async fn file_names(&self) -> std::io::Result<Vec<(PathBuf, String)>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                files.push((entry.path(), name.to_string()));
            }
        }
        Ok(files)
    }
}
