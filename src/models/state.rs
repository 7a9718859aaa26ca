//! Per-source history state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CatalogItem;

/// Persisted history of one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceState {
    /// Snapshot identifiers already folded into this state
    #[serde(default)]
    pub processed_files: BTreeSet<String>,

    /// Items of the most recently applied snapshot
    #[serde(default)]
    pub current_items: BTreeSet<CatalogItem>,

    /// Canonical item form -> first time the item was observed
    #[serde(default)]
    pub first_seen: BTreeMap<String, DateTime<Utc>>,

    /// Embedded timestamp of the most recently applied snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<DateTime<Utc>>,
}

impl SourceState {
    /// True until the first snapshot has been applied.
    pub fn is_fresh(&self) -> bool {
        self.processed_files.is_empty()
    }

    /// Whether a snapshot identifier has already been applied.
    pub fn has_processed(&self, snapshot_id: &str) -> bool {
        self.processed_files.contains(snapshot_id)
    }

    /// First observation of an item, if recorded.
    pub fn first_seen_of(&self, item: &CatalogItem) -> Option<DateTime<Utc>> {
        self.first_seen.get(&item.canonical()).copied()
    }
}
