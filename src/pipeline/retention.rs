//! Snapshot retirement.
//!
//! Only called once the kept snapshot is on disk and its state is saved, so
//! a source never drops to zero usable snapshots.

use std::path::Path;
use std::sync::Arc;

use crate::error::FailureKind;
use crate::storage::{ErrorLog, SnapshotStore};
use crate::utils::fs::remove_if_exists;

/// Removes superseded snapshot files.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    snapshots: SnapshotStore,
    errors: Arc<ErrorLog>,
}

impl RetentionManager {
    pub fn new(snapshots: SnapshotStore, errors: Arc<ErrorLog>) -> Self {
        Self { snapshots, errors }
    }

    /// Delete every snapshot of `source_id` except `keep`, plus leftover
    /// temp and rejected files. Returns the number of files removed.
    ///
    /// A file that cannot be removed is recorded in the error log and
    /// skipped; it is retried on the next retirement.
    pub async fn retire(&self, source_id: &str, keep: &Path) -> std::io::Result<usize> {
        if !tokio::fs::try_exists(keep).await? {
            log::warn!(
                "Not retiring snapshots of {}: kept file {:?} is missing",
                source_id,
                keep
            );
            self.errors
                .record_event(
                    source_id,
                    &keep.display().to_string(),
                    FailureKind::Io,
                    "kept snapshot missing, retirement skipped",
                )
                .await;
            return Ok(0);
        }

        let mut doomed: Vec<_> = self
            .snapshots
            .list(source_id)
            .await?
            .into_iter()
            .map(|s| s.path)
            .filter(|p| p != keep)
            .collect();
        doomed.extend(self.snapshots.leftovers(source_id).await?);

        let mut removed = 0;
        for path in doomed {
            match remove_if_exists(&path).await {
                Ok(true) => {
                    log::debug!("Retired {:?}", path);
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Failed to retire {:?}: {}", path, e);
                    self.errors
                        .record_event(
                            source_id,
                            &path.display().to_string(),
                            FailureKind::Io,
                            &format!("cannot retire snapshot: {}", e),
                        )
                        .await;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use crate::storage::snapshots::REJECTED_SUFFIX;
    use crate::utils::fs::with_suffix;

    fn error_log(tmp: &TempDir) -> Arc<ErrorLog> {
        Arc::new(ErrorLog::new(tmp.path().join("errors.jsonl")))
    }

    #[tokio::test]
    async fn test_retire_keeps_exactly_one() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let paths: Vec<_> = (8..12)
            .map(|h| store.path_for("Alpha", Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap()))
            .collect();
        for path in &paths {
            tokio::fs::write(path, b"x").await.unwrap();
        }
        let rejected = with_suffix(&paths[0], REJECTED_SUFFIX);
        tokio::fs::write(&rejected, b"bad").await.unwrap();
        let other = store.path_for("Beta", Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
        tokio::fs::write(&other, b"x").await.unwrap();

        let retention = RetentionManager::new(store.clone(), error_log(&tmp));
        let removed = retention.retire("Alpha", &paths[3]).await.unwrap();

        assert_eq!(removed, 4);
        let left = store.list("Alpha").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].path, paths[3]);
        assert!(!rejected.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_missing_keep_removes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let old = store.path_for("Alpha", Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
        tokio::fs::write(&old, b"x").await.unwrap();
        let ghost = store.path_for("Alpha", Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());

        let errors = error_log(&tmp);
        let retention = RetentionManager::new(store, errors.clone());
        assert_eq!(retention.retire("Alpha", &ghost).await.unwrap(), 0);
        assert!(old.exists());

        let entries = errors.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "Alpha");
        assert_eq!(entries[0].kind, "Io");
        assert_eq!(entries[0].endpoint, ghost.display().to_string());
    }
}
