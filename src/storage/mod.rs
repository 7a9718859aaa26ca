//! Storage for snapshots, per-source state and the run records.
//!
//! ## Directory Structure
//!
//! ```text
//! data/
//! ├── snapshots/                 # One current snapshot per source
//! │   └── Alpha_20260301T120000.000Z.m3u
//! ├── state/                     # One shard per source
//! │   └── Alpha.json
//! ├── changes/                   # Append-only change logs
//! │   └── LOG_Alpha.txt
//! ├── errors.jsonl               # Classified failures
//! └── history.json.migrated      # Legacy aggregate store, after migration
//! ```

pub mod changelog;
pub mod error_log;
pub mod local;
pub mod migration;
pub mod snapshots;

use async_trait::async_trait;

use crate::error::StateError;
use crate::models::SourceState;

// Re-export for convenience
pub use changelog::{ChangeLogWriter, DedupeStats};
pub use error_log::{ErrorEntry, ErrorLog};
pub use local::ShardStore;
pub use migration::{MigrationReport, migrate_legacy_store};
pub use snapshots::SnapshotStore;

/// Result type for state persistence.
pub type StateResult<T> = std::result::Result<T, StateError>;

/// Trait for per-source state backends.
///
/// Each source owns exactly one document; implementations must keep a
/// failure on one source from affecting any other.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state of one source. `Ok(None)` when nothing is stored yet.
    async fn load(&self, source_id: &str) -> StateResult<Option<SourceState>>;

    /// Persist the state of one source, replacing the previous document.
    async fn save(&self, source_id: &str, state: &SourceState) -> StateResult<()>;
}
