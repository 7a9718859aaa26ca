//! Bounded-concurrency fetch run over every source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ContentError, FailureKind, FetchError};
use crate::models::SourceDescriptor;
use crate::pipeline::apply::{ApplySummary, SnapshotApplier};
use crate::services::{CacheGate, CacheVerdict, Transport, read_catalog_link};
use crate::storage::{ErrorLog, SnapshotStore};
use crate::utils::console;
use crate::utils::fs::temp_path;

/// Final classification of one source in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Existing snapshot reused
    Cached,

    /// New snapshot downloaded
    Fetched,

    /// Classified failure
    Failed(FailureKind),

    /// Not started because the run was cancelled
    Skipped,
}

/// Result of processing one source.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source_id: String,
    pub name: String,
    pub status: SourceStatus,

    /// Cache verdict label (`fresh`, `stale`, `missing`, `corrupt`)
    pub verdict: Option<&'static str>,

    /// Bytes downloaded
    pub bytes: Option<u64>,

    /// Failure detail
    pub detail: Option<String>,

    /// Snapshot application result
    pub apply: Option<ApplySummary>,
}

impl SourceOutcome {
    fn new(source: &SourceDescriptor, status: SourceStatus) -> Self {
        Self {
            source_id: source.id.clone(),
            name: source.name.clone(),
            status,
            verdict: None,
            bytes: None,
            detail: None,
            apply: None,
        }
    }
}

/// Per-run totals, folded from the outcomes as they complete.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<SourceOutcome>,
    pub cancelled: bool,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record(&mut self, outcome: SourceOutcome) {
        self.outcomes.push(outcome);
    }

    fn count(&self, pred: impl Fn(&SourceStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn cached(&self) -> usize {
        self.count(|s| *s == SourceStatus::Cached)
    }

    pub fn fetched(&self) -> usize {
        self.count(|s| *s == SourceStatus::Fetched)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, SourceStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == SourceStatus::Skipped)
    }

    /// Failures a later run may clear on its own (timeouts, connection
    /// errors, server-side statuses).
    pub fn retryable(&self) -> usize {
        self.count(|s| matches!(s, SourceStatus::Failed(kind) if kind.is_retryable()))
    }

    /// Failure counts per kind.
    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            if let SourceStatus::Failed(kind) = outcome.status {
                *counts.entry(kind).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Snapshots applied across all sources.
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.apply.as_ref())
            .map(ApplySummary::applied)
            .sum()
    }

    pub fn outcome(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source_id == source_id)
    }
}

/// Removes an in-progress download unless it was committed.
struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed {
            match std::fs::remove_file(&self.path) {
                Ok(()) => log::debug!("Discarded partial download {:?}", self.path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {:?}: {}", self.path, e),
            }
        }
    }
}

/// Runs cache check, fetch and apply for every source.
pub struct FetchScheduler {
    transport: Transport,
    cache: CacheGate,
    snapshots: SnapshotStore,
    applier: SnapshotApplier,
    errors: Arc<ErrorLog>,
    max_concurrent: usize,
    show_progress: bool,
}

impl FetchScheduler {
    pub fn new(
        transport: Transport,
        cache: CacheGate,
        snapshots: SnapshotStore,
        applier: SnapshotApplier,
        errors: Arc<ErrorLog>,
    ) -> Self {
        let max_concurrent = transport.config().max_concurrent.max(1);
        Self {
            transport,
            cache,
            snapshots,
            applier,
            errors,
            max_concurrent,
            show_progress: false,
        }
    }

    /// Print one console line per finished source.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Process every source once with at most `max_concurrent` in flight.
    pub async fn run(&self, sources: &[SourceDescriptor], cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::new();
        log::info!(
            "Processing {} sources with {} slots",
            sources.len(),
            self.max_concurrent
        );

        let mut outcomes = stream::iter(sources)
            .map(|source| self.process(source, cancel))
            .buffer_unordered(self.max_concurrent);

        while let Some(outcome) = outcomes.next().await {
            if self.show_progress {
                print_outcome(&outcome);
            }
            report.record(outcome);
        }

        report.cancelled = cancel.is_cancelled();
        report.finished_at = Some(Utc::now());
        report
    }

    /// Handle one source end to end.
    pub async fn process(
        &self,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> SourceOutcome {
        if cancel.is_cancelled() {
            return SourceOutcome::new(source, SourceStatus::Skipped);
        }

        let verdict = self.cache.evaluate(source, Utc::now()).await;
        match &verdict {
            CacheVerdict::Corrupt { path, reason } => {
                log::warn!("[{}] Cached {:?} unusable: {}", source.name, path, reason);
            }
            CacheVerdict::Stale { reason, .. } => {
                log::debug!("[{}] Cache stale: {}", source.name, reason);
            }
            _ => {}
        }

        let fetched = match &source.expiry_field {
            Some(_) => self.refresh_linked(source, &verdict, cancel).await,
            None if verdict.is_fresh() => Ok(None),
            None => self.fetch(source, &source.url, cancel).await.map(Some),
        };

        let mut outcome = match fetched {
            Ok(None) => {
                log::debug!("[{}] Reusing cached snapshot", source.name);
                SourceOutcome::new(source, SourceStatus::Cached)
            }
            Ok(Some((id, size))) => {
                log::info!("[{}] Fetched {} ({} bytes)", source.name, id, size);
                let mut outcome = SourceOutcome::new(source, SourceStatus::Fetched);
                outcome.bytes = Some(size);
                outcome.detail = Some(id);
                outcome
            }
            Err(e) => {
                let mut outcome = self.fail(source, e.kind(), e.to_string()).await;
                outcome.verdict = Some(verdict.label());
                return outcome;
            }
        };
        outcome.verdict = Some(verdict.label());

        match self.applier.apply_pending(source).await {
            Ok(summary) => {
                let fetched_id = outcome.detail.take();
                let rejected_new = fetched_id
                    .as_ref()
                    .is_some_and(|id| summary.rejected.contains(id));
                if rejected_new {
                    // Already recorded by the applier
                    outcome.status = SourceStatus::Failed(FailureKind::NoRecognizableEntries);
                    outcome.detail = Some("no recognizable catalog entries".into());
                }
                outcome.apply = Some(summary);
                outcome
            }
            Err(e) => {
                let mut failed = self.fail(source, e.kind(), e.to_string()).await;
                failed.verdict = outcome.verdict;
                failed.bytes = outcome.bytes;
                failed
            }
        }
    }

    /// Refresh an expiry source in two stages: its link document, then the
    /// catalog the document points at.
    ///
    /// Returns `None` when the document is still valid and a catalog snapshot
    /// is already on disk.
    async fn refresh_linked(
        &self,
        source: &SourceDescriptor,
        verdict: &CacheVerdict,
        cancel: &CancellationToken,
    ) -> Result<Option<(String, u64)>, FetchError> {
        let document = self.snapshots.document_path(&source.id);
        if !verdict.is_fresh() {
            self.fetch_document(source, &document, cancel).await?;
        }

        let link = read_catalog_link(&tokio::fs::read(&document).await?)?;
        if verdict.is_fresh() && self.snapshots.latest(&source.id).await?.is_some() {
            return Ok(None);
        }

        log::debug!("[{}] Catalog link: {}", source.name, link);
        self.fetch(source, &link, cancel).await.map(Some)
    }

    /// Download the link document and replace the stored one if it is JSON.
    async fn fetch_document(
        &self,
        source: &SourceDescriptor,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        let mut temp = TempArtifact::new(temp_path(path));
        let size = self
            .transport
            .download_document(&source.url, temp.path(), cancel)
            .await?;

        let bytes = tokio::fs::read(temp.path()).await?;
        if serde_json::from_slice::<serde_json::Value>(&bytes).is_err() {
            return Err(ContentError::MalformedPayload.into());
        }
        tokio::fs::rename(temp.path(), path).await?;
        temp.disarm();

        log::info!("[{}] Link document refreshed ({} bytes)", source.name, size);
        Ok(size)
    }

    /// Download a catalog into a temp file and commit it under its final name.
    async fn fetch(
        &self,
        source: &SourceDescriptor,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, u64), FetchError> {
        let fetched_at = Utc::now();
        let final_path = self.snapshots.path_for(&source.id, fetched_at);
        let mut temp = TempArtifact::new(temp_path(&final_path));

        let size = self.transport.download(url, temp.path(), cancel).await?;
        tokio::fs::rename(temp.path(), &final_path).await?;
        temp.disarm();

        let id = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok((id, size))
    }

    async fn fail(&self, source: &SourceDescriptor, kind: FailureKind, detail: String) -> SourceOutcome {
        if kind == FailureKind::Cancelled {
            log::info!("[{}] Cancelled", source.name);
        } else {
            log::warn!("[{}] {} ({}): {}", source.name, kind, source.url, detail);
            self.errors.record(source, kind, &detail).await;
        }

        let mut outcome = SourceOutcome::new(source, SourceStatus::Failed(kind));
        outcome.detail = Some(detail);
        outcome
    }
}

fn print_outcome(outcome: &SourceOutcome) {
    match outcome.status {
        SourceStatus::Cached | SourceStatus::Fetched => {
            let label = if outcome.status == SourceStatus::Cached {
                "CACHED"
            } else {
                "FETCHED"
            };
            let changes = outcome
                .apply
                .as_ref()
                .map(|s| {
                    let (added, removed) = s.totals();
                    format!("{} items, +{} / -{}", s.item_count, added, removed)
                })
                .unwrap_or_default();
            console::success(&format!("{} {} {}", label, outcome.name, changes));
        }
        SourceStatus::Failed(kind) => {
            console::failure(&format!(
                "{} {}: {}",
                kind,
                outcome.name,
                outcome.detail.as_deref().unwrap_or("")
            ));
        }
        SourceStatus::Skipped => console::sub_item(&format!("SKIPPED {}", outcome.name)),
    }
}
