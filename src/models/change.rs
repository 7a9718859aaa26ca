//! Change records derived from applying a snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::CatalogItem;

/// An added or removed item together with its first observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedItem {
    pub item: CatalogItem,
    pub first_seen: DateTime<Utc>,
}

/// What a snapshot changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    /// First snapshot of a source
    Baseline { item_count: usize },

    /// Set difference against the previous snapshot
    Delta {
        added: Vec<AnnotatedItem>,
        removed: Vec<AnnotatedItem>,
    },
}

/// One history entry for a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    /// Embedded timestamp of the snapshot
    pub timestamp: DateTime<Utc>,

    /// Snapshot identifier
    pub snapshot: String,

    pub kind: ChangeKind,
}

impl ChangeRecord {
    /// True for a delta with no additions and no removals.
    pub fn is_empty_delta(&self) -> bool {
        matches!(&self.kind, ChangeKind::Delta { added, removed } if added.is_empty() && removed.is_empty())
    }

    /// (added, removed) counts; a baseline counts every item as added.
    pub fn counts(&self) -> (usize, usize) {
        match &self.kind {
            ChangeKind::Baseline { item_count } => (*item_count, 0),
            ChangeKind::Delta { added, removed } => (added.len(), removed.len()),
        }
    }
}
