//! Incremental history for one source.
//!
//! Folds a parsed snapshot into the prior [`SourceState`], producing a
//! [`ChangeRecord`] and the updated state. The prior state is never mutated;
//! callers persist the returned state only when they accept the outcome.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::models::{AnnotatedItem, CatalogItem, ChangeKind, ChangeRecord, SourceState};

/// Result of folding one snapshot into a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Snapshot identifier already in `processed_files`; nothing computed
    AlreadyProcessed,

    /// Snapshot is not newer than the last applied one; not applied
    Superseded { last_applied: DateTime<Utc> },

    /// Snapshot applied
    Applied {
        record: ChangeRecord,
        state: SourceState,
    },
}

/// Engine folding snapshots into per-source state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fold `items` from snapshot `snapshot_id` taken at `fetched_at` into `prior`.
    ///
    /// - Already processed identifiers are a no-op.
    /// - Snapshots not newer than `prior.last_applied` are refused.
    /// - The first snapshot of a source is a baseline.
    /// - `first_seen` entries are only ever inserted.
    pub fn apply(
        &self,
        items: &BTreeSet<CatalogItem>,
        prior: &SourceState,
        snapshot_id: &str,
        fetched_at: DateTime<Utc>,
    ) -> DiffOutcome {
        if prior.has_processed(snapshot_id) {
            return DiffOutcome::AlreadyProcessed;
        }
        if let Some(last_applied) = prior.last_applied {
            if fetched_at <= last_applied {
                return DiffOutcome::Superseded { last_applied };
            }
        }

        let mut state = prior.clone();
        for item in items {
            state
                .first_seen
                .entry(item.canonical())
                .or_insert(fetched_at);
        }

        let kind = if prior.is_fresh() {
            ChangeKind::Baseline {
                item_count: items.len(),
            }
        } else {
            let annotate = |item: &CatalogItem| AnnotatedItem {
                item: item.clone(),
                first_seen: state.first_seen_of(item).unwrap_or(fetched_at),
            };
            let added = items
                .difference(&prior.current_items)
                .map(annotate)
                .collect();
            let removed = prior
                .current_items
                .difference(items)
                .map(annotate)
                .collect();
            ChangeKind::Delta { added, removed }
        };

        state.current_items = items.clone();
        state.processed_files.insert(snapshot_id.to_string());
        state.last_applied = Some(fetched_at);

        DiffOutcome::Applied {
            record: ChangeRecord {
                timestamp: fetched_at,
                snapshot: snapshot_id.to_string(),
                kind,
            },
            state,
        }
    }
}

/// Convenience function to fold one snapshot.
pub fn diff(
    items: &BTreeSet<CatalogItem>,
    prior: &SourceState,
    snapshot_id: &str,
    fetched_at: DateTime<Utc>,
) -> DiffOutcome {
    DiffEngine::new().apply(items, prior, snapshot_id, fetched_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(n: usize) -> CatalogItem {
        CatalogItem::new("News", &format!("Channel {n}"), &format!("{n}.ts"))
    }

    fn items(range: impl IntoIterator<Item = usize>) -> BTreeSet<CatalogItem> {
        range.into_iter().map(item).collect()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn applied(outcome: DiffOutcome) -> (ChangeRecord, SourceState) {
        match outcome {
            DiffOutcome::Applied { record, state } => (record, state),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn test_first_snapshot_is_baseline() {
        let (record, state) = applied(diff(&items(0..100), &SourceState::default(), "s1", t0()));

        assert_eq!(record.kind, ChangeKind::Baseline { item_count: 100 });
        assert_eq!(state.current_items.len(), 100);
        assert_eq!(state.first_seen.len(), 100);
        assert!(state.has_processed("s1"));
        assert_eq!(state.last_applied, Some(t0()));
    }

    #[test]
    fn test_added_and_removed() {
        let (_, state) = applied(diff(&items(0..100), &SourceState::default(), "s1", t0()));
        let t1 = t0() + Duration::days(1);
        let next = items((2..100).chain(100..103));

        let (record, state) = applied(diff(&next, &state, "s2", t1));
        let ChangeKind::Delta { added, removed } = record.kind else {
            panic!("expected delta");
        };

        assert_eq!(added.len(), 3);
        assert!(added.iter().all(|a| a.first_seen == t1));
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|r| r.first_seen == t0()));
        assert_eq!(state.current_items, next);
        // Removed items keep their entry
        assert_eq!(state.first_seen_of(&item(0)), Some(t0()));
    }

    #[test]
    fn test_reapplying_is_noop() {
        let (_, state) = applied(diff(&items(0..10), &SourceState::default(), "s1", t0()));
        assert_eq!(diff(&items(0..5), &state, "s1", t0()), DiffOutcome::AlreadyProcessed);
    }

    #[test]
    fn test_first_seen_survives_reappearance() {
        let t1 = t0() + Duration::days(1);
        let t2 = t0() + Duration::days(2);
        let (_, state) = applied(diff(&items(0..3), &SourceState::default(), "s1", t0()));
        let (_, state) = applied(diff(&items(1..3), &state, "s2", t1));
        let (record, state) = applied(diff(&items(0..3), &state, "s3", t2));

        assert_eq!(state.first_seen_of(&item(0)), Some(t0()));
        let ChangeKind::Delta { added, .. } = record.kind else {
            panic!("expected delta");
        };
        assert_eq!(added[0].first_seen, t0());
    }

    #[test]
    fn test_older_snapshot_is_superseded() {
        let t1 = t0() + Duration::hours(1);
        let (_, state) = applied(diff(&items(0..3), &SourceState::default(), "late", t1));

        assert_eq!(
            diff(&items(0..1), &state, "early", t0()),
            DiffOutcome::Superseded { last_applied: t1 }
        );
    }

    #[test]
    fn test_ordered_application_is_deterministic() {
        let snapshots = [
            ("s1", t0(), items(0..10)),
            ("s2", t0() + Duration::hours(1), items(3..12)),
            ("s3", t0() + Duration::hours(2), items(5..15)),
        ];

        let run = || {
            let mut state = SourceState::default();
            let mut records = Vec::new();
            for (id, ts, set) in &snapshots {
                let (record, next) = applied(diff(set, &state, id, *ts));
                records.push(record);
                state = next;
            }
            (records, state)
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_unchanged_snapshot_is_empty_delta() {
        let (_, state) = applied(diff(&items(0..4), &SourceState::default(), "s1", t0()));
        let (record, _) = applied(diff(&items(0..4), &state, "s2", t0() + Duration::hours(1)));
        assert!(record.is_empty_delta());
    }
}
