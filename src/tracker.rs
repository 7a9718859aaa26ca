// src/tracker.rs

//! Wiring of stores and services from a [`Config`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{FailureKind, Result};
use crate::models::{Config, SourceDescriptor};
use crate::pipeline::{ApplySummary, FetchScheduler, RunReport, SnapshotApplier};
use crate::services::{CacheGate, CatalogParser, Transport};
use crate::storage::{
    ChangeLogWriter, ErrorLog, MigrationReport, ShardStore, SnapshotStore, StateResult,
    migrate_legacy_store,
};

/// Every component of a tracker instance, built once per command.
pub struct Tracker {
    config: Config,
    snapshots: SnapshotStore,
    shards: ShardStore,
    changelog: ChangeLogWriter,
    errors: Arc<ErrorLog>,
    applier: SnapshotApplier,
}

impl Tracker {
    /// Build the stores and the applier. No network client is created.
    pub fn new(config: Config) -> Result<Self> {
        let paths = &config.paths;
        let snapshots = SnapshotStore::new(&paths.snapshot_dir);
        let shards = ShardStore::new(&paths.state_dir);
        let changelog = ChangeLogWriter::new(&paths.changelog_dir);
        let errors = Arc::new(ErrorLog::new(&paths.error_log));
        let applier = SnapshotApplier::new(
            CatalogParser::new(&config.parser)?,
            Arc::new(shards.clone()),
            snapshots.clone(),
            changelog.clone(),
            Arc::clone(&errors),
        );

        Ok(Self {
            config,
            snapshots,
            shards,
            changelog,
            errors,
            applier,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn shards(&self) -> &ShardStore {
        &self.shards
    }

    pub fn changelog(&self) -> &ChangeLogWriter {
        &self.changelog
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn applier(&self) -> &SnapshotApplier {
        &self.applier
    }

    /// Split the legacy aggregate store into shards if one is present.
    ///
    /// A quarantined or unfinished migration is recorded in the error log
    /// under the legacy store's path.
    pub async fn migrate(&self) -> StateResult<MigrationReport> {
        let legacy = &self.config.paths.legacy_store;
        let result = migrate_legacy_store(legacy, &self.shards).await;
        let failure = match &result {
            Ok(MigrationReport::Quarantined { reason, .. }) => Some(reason.clone()),
            Err(e) => Some(e.to_string()),
            Ok(_) => None,
        };
        if let Some(detail) = failure {
            self.errors
                .record_event(
                    "legacy store",
                    &legacy.display().to_string(),
                    FailureKind::MigrationFailure,
                    &detail,
                )
                .await;
        }
        result
    }

    /// Migrate unless already done, logging the outcome. Never fails the
    /// caller: a broken legacy store is quarantined and work continues with
    /// fresh state.
    async fn migrate_first(&self) {
        match self.migrate().await {
            Ok(MigrationReport::NotFound) => {}
            Ok(report) => log::info!("Legacy store: {:?}", report),
            Err(e) => log::error!("Legacy migration could not complete: {}", e),
        }
    }

    /// Build the fetch scheduler.
    pub fn scheduler(&self) -> Result<FetchScheduler> {
        let transport = Transport::new(&self.config.fetch)?;
        let cache = CacheGate::new(
            self.snapshots.clone(),
            &self.config.cache,
            self.config.fetch.sniff_bytes,
        );
        Ok(FetchScheduler::new(
            transport,
            cache,
            self.snapshots.clone(),
            self.applier.clone(),
            Arc::clone(&self.errors),
        )
        .with_progress(self.config.logging.show_progress))
    }

    /// Migrate if needed, then run every source once.
    pub async fn run(
        &self,
        sources: &[SourceDescriptor],
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        self.migrate_first().await;
        let scheduler = self.scheduler()?;
        Ok(scheduler.run(sources, cancel).await)
    }

    /// Migrate if needed, then apply the snapshots already on disk for
    /// every source, in order. Per-source failures are recorded in the error
    /// log and returned alongside the source.
    pub async fn apply_all<'a>(
        &self,
        sources: &'a [SourceDescriptor],
    ) -> Vec<(&'a SourceDescriptor, StateResult<ApplySummary>)> {
        self.migrate_first().await;

        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            let result = self.applier.apply_pending(source).await;
            if let Err(e) = &result {
                log::error!("[{}] Apply failed: {}", source.name, e);
                self.errors.record(source, e.kind(), &e.to_string()).await;
            }
            results.push((source, result));
        }
        results
    }
}
