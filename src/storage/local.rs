//! Local filesystem shard storage.
//!
//! ## Storage Layout
//!
//! ```text
//! {state_dir}/
//! ├── Alpha.json
//! └── Beta.json
//! ```
//!
//! Shards are written atomically (temp file, then rename), so a crash
//! mid-write leaves the previous document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StateError;
use crate::models::SourceState;
use crate::storage::{StateResult, StateStore};
use crate::utils::fs::{read_optional, write_atomic};

/// Shard extension.
const SHARD_EXTENSION: &str = "json";

/// Filesystem-backed state store, one JSON document per source.
#[derive(Debug, Clone)]
pub struct ShardStore {
    state_dir: PathBuf,
}

impl ShardStore {
    /// Create a store rooted at the given directory.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Path of the shard for a source.
    pub fn shard_path(&self, source_id: &str) -> PathBuf {
        self.state_dir
            .join(format!("{}.{}", source_id, SHARD_EXTENSION))
    }

    /// Whether a shard document exists for the source.
    pub async fn exists(&self, source_id: &str) -> bool {
        tokio::fs::try_exists(self.shard_path(source_id))
            .await
            .unwrap_or(false)
    }

    /// Identifiers of every stored shard, sorted.
    pub async fn list_ids(&self) -> StateResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == SHARD_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl StateStore for ShardStore {
    async fn load(&self, source_id: &str) -> StateResult<Option<SourceState>> {
        let path = self.shard_path(source_id);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StateError::CorruptShard {
                source_id: source_id.to_string(),
                message: e.to_string(),
            })
    }

    async fn save(&self, source_id: &str, state: &SourceState) -> StateResult<()> {
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| StateError::Io(e.to_string()))?;
        write_atomic(&self.shard_path(source_id), &bytes).await?;
        log::debug!(
            "Saved shard {} ({} items, {} snapshots)",
            source_id,
            state.current_items.len(),
            state.processed_files.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogItem;
    use tempfile::TempDir;

    fn sample_state() -> SourceState {
        let mut state = SourceState::default();
        state.processed_files.insert("Alpha_20260301T120000.000Z.m3u".into());
        state
            .current_items
            .insert(CatalogItem::new("News", "Channel 1", "1.ts"));
        state
    }

    #[tokio::test]
    async fn test_load_missing_shard() {
        let tmp = TempDir::new().unwrap();
        let store = ShardStore::new(tmp.path());
        assert_eq!(store.load("Alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let store = ShardStore::new(tmp.path().join("state"));

        store.save("Alpha", &sample_state()).await.unwrap();
        let loaded = store.load("Alpha").await.unwrap();

        assert_eq!(loaded, Some(sample_state()));
        assert!(store.exists("Alpha").await);
        assert!(!store.exists("Beta").await);
    }

    #[tokio::test]
    async fn test_corrupt_shard_is_isolated() {
        let tmp = TempDir::new().unwrap();
        let store = ShardStore::new(tmp.path());

        store.save("Good", &sample_state()).await.unwrap();
        tokio::fs::write(store.shard_path("Bad"), b"{ not json")
            .await
            .unwrap();

        let err = store.load("Bad").await.unwrap_err();
        assert!(matches!(err, StateError::CorruptShard { ref source_id, .. } if source_id == "Bad"));
        assert_eq!(store.load("Good").await.unwrap(), Some(sample_state()));
        // Left in place for inspection
        assert!(store.shard_path("Bad").exists());
    }

    #[tokio::test]
    async fn test_list_ids() {
        let tmp = TempDir::new().unwrap();
        let store = ShardStore::new(tmp.path());
        assert!(store.list_ids().await.unwrap().is_empty());

        store.save("Beta", &SourceState::default()).await.unwrap();
        store.save("Alpha", &SourceState::default()).await.unwrap();
        tokio::fs::write(tmp.path().join("notes.txt"), b"x").await.unwrap();

        assert_eq!(store.list_ids().await.unwrap(), vec!["Alpha", "Beta"]);
    }
}
