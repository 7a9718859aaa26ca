//! One-time split of the legacy aggregate history file into shards.
//!
//! The legacy store is a single JSON object keyed by source name:
//!
//! ```json
//! {
//!   "Alpha": {
//!     "processed_files": ["Alpha_20260301T120000.000Z.m3u"],
//!     "current_items": ["News | Channel 1 | 1.ts"],
//!     "first_seen": { "News | Channel 1 | 1.ts": "2026-03-01 12:00:00" }
//!   }
//! }
//! ```
//!
//! After a successful split the file is renamed `*.migrated`; if it cannot be
//! parsed (or a shard cannot be written) it is renamed `*.failed`. Either way
//! it is never read again.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::StateError;
use crate::models::{CatalogItem, SourceDescriptor, SourceState, parse_snapshot_file_name};
use crate::storage::{ShardStore, StateResult, StateStore};
use crate::utils::fs::{read_optional, with_suffix};
use crate::utils::parse_loose_timestamp;

/// Suffix of a successfully migrated legacy store.
pub const MIGRATED_SUFFIX: &str = ".migrated";

/// Suffix of a legacy store that could not be migrated.
pub const FAILED_SUFFIX: &str = ".failed";

/// What a migration attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationReport {
    /// No legacy store present
    NotFound,

    /// Shards written and legacy file archived
    Migrated {
        written: usize,
        skipped_existing: usize,
        skipped_invalid: usize,
        /// Entries dropped because an earlier name mapped to the same shard
        id_collisions: usize,
        archived_to: PathBuf,
    },

    /// Legacy file could not be migrated and was moved aside
    Quarantined { moved_to: PathBuf, reason: String },
}

#[derive(Debug, Default, Deserialize)]
struct LegacyEntry {
    #[serde(default)]
    processed_files: Vec<String>,

    #[serde(default)]
    current_items: Vec<String>,

    #[serde(default)]
    first_seen: BTreeMap<String, String>,
}

/// Migrate `legacy_path` into `store` if it exists.
///
/// Existing shards are never overwritten. Legacy names are visited in sorted
/// order; when two normalize to the same identifier the first one wins and
/// the other is counted as a collision. Only a failure to rename the legacy
/// file is returned as an error; every other problem quarantines the file.
pub async fn migrate_legacy_store(
    legacy_path: &Path,
    store: &ShardStore,
) -> StateResult<MigrationReport> {
    let Some(bytes) = read_optional(legacy_path).await? else {
        return Ok(MigrationReport::NotFound);
    };

    log::info!("Migrating legacy store {:?}", legacy_path);

    let entries: BTreeMap<String, serde_json::Value> = match serde_json::from_slice(&bytes) {
        Ok(entries) => entries,
        Err(e) => return quarantine(legacy_path, format!("unparseable legacy store: {e}")).await,
    };

    let mut written = 0;
    let mut skipped_existing = 0;
    let mut skipped_invalid = 0;
    let mut id_collisions = 0;
    let mut claimed: HashMap<String, String> = HashMap::new();

    for (name, value) in entries {
        let entry: LegacyEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping legacy entry '{}': {}", name, e);
                skipped_invalid += 1;
                continue;
            }
        };

        let source_id = SourceDescriptor::normalize_id(&name, "");
        if let Some(first) = claimed.get(&source_id) {
            log::warn!(
                "Legacy entries '{}' and '{}' both map to shard {}; dropping '{}'",
                first,
                name,
                source_id,
                name
            );
            id_collisions += 1;
            continue;
        }
        claimed.insert(source_id.clone(), name.clone());

        if store.exists(&source_id).await {
            log::warn!(
                "Shard for '{}' ({}) already exists, keeping it",
                name,
                source_id
            );
            skipped_existing += 1;
            continue;
        }

        let state = convert_entry(&name, entry);
        if let Err(e) = store.save(&source_id, &state).await {
            return quarantine(
                legacy_path,
                format!("failed to write shard for '{name}': {e}"),
            )
            .await;
        }
        written += 1;
    }

    let archived_to = with_suffix(legacy_path, MIGRATED_SUFFIX);
    tokio::fs::rename(legacy_path, &archived_to).await?;
    log::info!(
        "Legacy migration done: {} shards written, {} existing kept, {} invalid skipped, {} id collisions",
        written,
        skipped_existing,
        skipped_invalid,
        id_collisions
    );

    Ok(MigrationReport::Migrated {
        written,
        skipped_existing,
        skipped_invalid,
        id_collisions,
        archived_to,
    })
}

async fn quarantine(legacy_path: &Path, reason: String) -> StateResult<MigrationReport> {
    let moved_to = with_suffix(legacy_path, FAILED_SUFFIX);
    let failure = StateError::MigrationFailure(reason.clone());
    log::error!("{}; moving legacy store to {:?}", failure, moved_to);
    tokio::fs::rename(legacy_path, &moved_to).await?;
    Ok(MigrationReport::Quarantined { moved_to, reason })
}

fn convert_entry(name: &str, entry: LegacyEntry) -> SourceState {
    let mut state = SourceState::default();

    for file in entry.processed_files {
        let id = Path::new(&file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(file);
        if let Some((_, ts)) = parse_snapshot_file_name(&id) {
            state.last_applied = state.last_applied.max(Some(ts));
        }
        state.processed_files.insert(id);
    }

    for raw in entry.current_items {
        match CatalogItem::parse_canonical(&raw) {
            Some(item) => {
                state.current_items.insert(item);
            }
            None => log::warn!("'{}': skipping unreadable item {:?}", name, raw),
        }
    }

    for (raw, when) in entry.first_seen {
        let Some(ts) = parse_loose_timestamp(&when) else {
            log::warn!("'{}': skipping first_seen with bad date {:?}", name, when);
            continue;
        };
        let key = CatalogItem::parse_canonical(&raw)
            .map(|item| item.canonical())
            .unwrap_or(raw);
        state.first_seen.entry(key).or_insert(ts);
    }

    state
}
