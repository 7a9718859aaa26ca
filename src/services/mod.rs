//! Service layer for the tracker.
//!
//! This module contains the building blocks a run composes:
//! - Snapshot reuse decisions (`CacheGate`)
//! - Network fetches (`Transport`)
//! - Catalog parsing (`CatalogParser`)
//! - Catalog links of expiry sources (`read_catalog_link`)

pub mod cache;
pub mod link;
pub mod parser;
pub mod transport;

pub use cache::{CacheGate, CacheVerdict, StaleReason};
pub use link::{catalog_link, read_catalog_link};
pub use parser::CatalogParser;
pub use transport::{Transport, sniff};
