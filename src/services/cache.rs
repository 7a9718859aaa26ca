// src/services/cache.rs

//! Snapshot reuse decisions.
//!
//! Catalog sources are judged by their newest snapshot. Expiry sources are
//! judged by their stored link document and the expiry it embeds.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tokio::io::AsyncReadExt;

use crate::models::{CacheConfig, Snapshot, SourceDescriptor};
use crate::services::transport::sniff;
use crate::storage::SnapshotStore;
use crate::utils::parse_loose_timestamp;

/// Why an existing snapshot is not reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// Older than the TTL
    Expired { age_secs: i64 },

    /// Below the size floor
    Undersized { size: u64 },

    /// Embedded expiry is past or inside the safety margin
    PastExpiry { expires_at: DateTime<Utc> },

    /// Embedded expiry field is absent
    NoExpiry,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired { age_secs } => write!(f, "expired ({}s old)", age_secs),
            Self::Undersized { size } => write!(f, "undersized ({} bytes)", size),
            Self::PastExpiry { expires_at } => write!(f, "expiry reached ({})", expires_at),
            Self::NoExpiry => f.write_str("no expiry field"),
        }
    }
}

/// Cache decision for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheVerdict {
    Fresh { snapshot: Snapshot },
    Stale { snapshot: Snapshot, reason: StaleReason },
    Missing,
    Corrupt { path: PathBuf, reason: String },
}

impl CacheVerdict {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh { .. } => "fresh",
            Self::Stale { .. } => "stale",
            Self::Missing => "missing",
            Self::Corrupt { .. } => "corrupt",
        }
    }
}

/// Decides whether a source's current snapshot can be reused.
#[derive(Debug, Clone)]
pub struct CacheGate {
    snapshots: SnapshotStore,
    config: CacheConfig,
    sniff_bytes: usize,
}

impl CacheGate {
    pub fn new(snapshots: SnapshotStore, config: &CacheConfig, sniff_bytes: usize) -> Self {
        Self {
            snapshots,
            config: config.clone(),
            sniff_bytes,
        }
    }

    /// Evaluate the cached artifact of `source` at time `now`.
    pub async fn evaluate(&self, source: &SourceDescriptor, now: DateTime<Utc>) -> CacheVerdict {
        let artifact = match &source.expiry_field {
            Some(_) => self.snapshots.document(&source.id).await,
            None => self.snapshots.latest(&source.id).await,
        };
        let snapshot = match artifact {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return CacheVerdict::Missing,
            Err(e) => {
                return CacheVerdict::Corrupt {
                    path: self.snapshots.dir().to_path_buf(),
                    reason: format!("cannot read cached artifact: {e}"),
                };
            }
        };

        match &source.expiry_field {
            Some(field) => self.evaluate_expiry(snapshot, field, now).await,
            None => self.evaluate_catalog(snapshot, now).await,
        }
    }

    async fn evaluate_catalog(&self, snapshot: Snapshot, now: DateTime<Utc>) -> CacheVerdict {
        let prefix = match read_prefix(&snapshot, self.sniff_bytes).await {
            Ok(prefix) => prefix,
            Err(e) => return corrupt(snapshot, format!("unreadable: {e}")),
        };
        if let Some(error) = sniff(&prefix) {
            return corrupt(snapshot, error.to_string());
        }

        if snapshot.size < self.config.min_size_bytes {
            let size = snapshot.size;
            return CacheVerdict::Stale {
                snapshot,
                reason: StaleReason::Undersized { size },
            };
        }

        let age = snapshot.age(now);
        if age >= Duration::seconds(self.config.ttl_secs as i64) {
            return CacheVerdict::Stale {
                snapshot,
                reason: StaleReason::Expired {
                    age_secs: age.num_seconds(),
                },
            };
        }
        CacheVerdict::Fresh { snapshot }
    }

    async fn evaluate_expiry(
        &self,
        snapshot: Snapshot,
        field: &str,
        now: DateTime<Utc>,
    ) -> CacheVerdict {
        let bytes = match tokio::fs::read(&snapshot.path).await {
            Ok(bytes) => bytes,
            Err(e) => return corrupt(snapshot, format!("unreadable: {e}")),
        };
        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => return corrupt(snapshot, format!("not a JSON document: {e}")),
        };

        let expires_at = match value.get(field) {
            None | Some(serde_json::Value::Null) => {
                return CacheVerdict::Stale {
                    snapshot,
                    reason: StaleReason::NoExpiry,
                };
            }
            Some(raw) => match parse_expiry(raw) {
                Some(ts) => ts,
                None => return corrupt(snapshot, format!("unreadable {field} value: {raw}")),
            },
        };

        let margin = Duration::seconds(self.config.expiry_margin_secs as i64);
        if expires_at <= now + margin {
            return CacheVerdict::Stale {
                snapshot,
                reason: StaleReason::PastExpiry { expires_at },
            };
        }
        CacheVerdict::Fresh { snapshot }
    }
}

fn corrupt(snapshot: Snapshot, reason: String) -> CacheVerdict {
    CacheVerdict::Corrupt {
        path: snapshot.path,
        reason,
    }
}

/// Expiry as a date string or a unix timestamp in seconds or milliseconds.
fn parse_expiry(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_loose_timestamp(s),
        serde_json::Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw > 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

async fn read_prefix(snapshot: &Snapshot, len: usize) -> std::io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(&snapshot.path).await?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}
