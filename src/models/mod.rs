// src/models/mod.rs

//! Domain models for the tracker.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod change;
mod config;
mod item;
mod snapshot;
mod source;
mod state;

// Re-export all public types
pub use change::{AnnotatedItem, ChangeKind, ChangeRecord};
pub use config::{
    CacheConfig, Config, FetchConfig, KeyRule, LoggingConfig, ParserConfig, PathsConfig,
    RequestMethod,
};
pub use item::CatalogItem;
pub use snapshot::{SNAPSHOT_EXTENSION, Snapshot, parse_snapshot_file_name, snapshot_file_name};
pub use source::{SourceDescriptor, load_sources, validate_sources};
pub use state::SourceState;
