//! Folding pending snapshots into per-source state.
//!
//! For one source: load its shard, then for every snapshot on disk in
//! ascending timestamp order parse → diff → save shard → append change log.
//! When anything new was applied, superseded snapshot files are retired.

use std::sync::Arc;

use crate::error::FailureKind;
use crate::models::{ChangeRecord, SourceDescriptor, SourceState};
use crate::pipeline::diff::{DiffEngine, DiffOutcome};
use crate::pipeline::retention::RetentionManager;
use crate::services::CatalogParser;
use crate::storage::{ChangeLogWriter, ErrorLog, SnapshotStore, StateResult, StateStore};

/// What one pass over a source's snapshots did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Records of the snapshots applied, in application order
    pub records: Vec<ChangeRecord>,

    /// Snapshots skipped because they were already applied
    pub already_processed: usize,

    /// Snapshots older than the last applied one
    pub superseded: usize,

    /// Snapshots the parser refused (identifiers)
    pub rejected: Vec<String>,

    /// Files removed by retention
    pub retired: usize,

    /// Item count after the pass
    pub item_count: usize,
}

impl ApplySummary {
    pub fn applied(&self) -> usize {
        self.records.len()
    }

    /// Total (added, removed) across the applied records.
    pub fn totals(&self) -> (usize, usize) {
        self.records.iter().fold((0, 0), |(a, r), record| {
            let (added, removed) = record.counts();
            (a + added, r + removed)
        })
    }
}

/// Applies pending snapshots of a source.
#[derive(Clone)]
pub struct SnapshotApplier {
    parser: CatalogParser,
    engine: DiffEngine,
    store: Arc<dyn StateStore>,
    snapshots: SnapshotStore,
    changelog: ChangeLogWriter,
    retention: RetentionManager,
    errors: Arc<ErrorLog>,
}

impl SnapshotApplier {
    pub fn new(
        parser: CatalogParser,
        store: Arc<dyn StateStore>,
        snapshots: SnapshotStore,
        changelog: ChangeLogWriter,
        errors: Arc<ErrorLog>,
    ) -> Self {
        Self {
            parser,
            engine: DiffEngine::new(),
            store,
            retention: RetentionManager::new(snapshots.clone(), errors.clone()),
            snapshots,
            changelog,
            errors,
        }
    }

    /// Apply every not-yet-processed snapshot of `source`.
    ///
    /// A corrupt shard aborts the pass for this source and leaves the shard
    /// untouched. Unparseable snapshots are recorded and renamed aside; the
    /// state is left as it was.
    pub async fn apply_pending(&self, source: &SourceDescriptor) -> StateResult<ApplySummary> {
        let mut state: SourceState = self.store.load(&source.id).await?.unwrap_or_default();
        let snapshots = self.snapshots.list(&source.id).await?;
        let mut summary = ApplySummary::default();

        for snapshot in &snapshots {
            let id = snapshot.id();
            if state.has_processed(&id) {
                summary.already_processed += 1;
                continue;
            }

            let bytes = match tokio::fs::read(&snapshot.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let detail = format!("cannot read snapshot {id}: {e}");
                    log::warn!("[{}] {}", source.name, detail);
                    self.errors.record(source, FailureKind::Io, &detail).await;
                    continue;
                }
            };

            let items = match self.parser.parse_bytes(&bytes) {
                Ok(items) => items,
                Err(e) => {
                    log::warn!("[{}] {}: {}", source.name, id, e);
                    self.errors
                        .record(source, e.kind(), &format!("{id}: {e}"))
                        .await;
                    if let Err(e) = self.snapshots.reject(snapshot).await {
                        let detail = format!("cannot move {id} aside: {e}");
                        log::warn!("[{}] {}", source.name, detail);
                        self.errors
                            .record_event(
                                &source.name,
                                &snapshot.path.display().to_string(),
                                FailureKind::Io,
                                &detail,
                            )
                            .await;
                    }
                    summary.rejected.push(id);
                    continue;
                }
            };

            match self.engine.apply(&items, &state, &id, snapshot.fetched_at) {
                DiffOutcome::AlreadyProcessed => summary.already_processed += 1,
                DiffOutcome::Superseded { last_applied } => {
                    log::info!(
                        "[{}] Skipping {}: not newer than last applied snapshot ({})",
                        source.name,
                        id,
                        last_applied
                    );
                    summary.superseded += 1;
                }
                DiffOutcome::Applied { record, state: next } => {
                    self.store.save(&source.id, &next).await?;
                    state = next;

                    if let Err(e) = self.changelog.append(&source.id, &record).await {
                        let detail = format!("change log append failed for {id}: {e}");
                        log::error!("[{}] {}", source.name, detail);
                        self.errors.record(source, FailureKind::Io, &detail).await;
                    }

                    let (added, removed) = record.counts();
                    log::info!(
                        "[{}] Applied {} (+{} / -{})",
                        source.name,
                        id,
                        added,
                        removed
                    );
                    summary.records.push(record);
                }
            }
        }

        if summary.applied() > 0 || summary.superseded > 0 {
            let keep = snapshots
                .iter()
                .filter(|s| Some(s.fetched_at) == state.last_applied)
                .find(|s| state.has_processed(&s.id()));
            if let Some(keep) = keep {
                summary.retired = self.retention.retire(&source.id, &keep.path).await?;
            }
        }

        summary.item_count = state.current_items.len();
        Ok(summary)
    }
}
