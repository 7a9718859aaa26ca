//! Pipeline stages for tracker runs.
//!
//! - `scheduler`: bounded-concurrency cache check and fetch over every source
//! - `apply`: fold pending snapshots of a source into its state
//! - `diff`: the per-snapshot history computation
//! - `retention`: retire superseded snapshot files
//! - `audit`: classify snapshot files on disk

pub mod apply;
pub mod audit;
pub mod diff;
pub mod retention;
pub mod scheduler;

pub use apply::{ApplySummary, SnapshotApplier};
pub use audit::{AuditClass, AuditEntry, audit_dir};
pub use diff::{DiffEngine, DiffOutcome, diff};
pub use retention::RetentionManager;
pub use scheduler::{FetchScheduler, RunReport, SourceOutcome, SourceStatus};
