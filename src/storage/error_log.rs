//! Durable record of classified failures.
//!
//! One JSON object per line. Workers share a single [`ErrorLog`]; appends are
//! serialized through an async mutex so lines never interleave.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::FailureKind;
use crate::models::SourceDescriptor;
use crate::utils::fs::{ensure_parent, read_optional};

/// One failure line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Source display name
    pub source: String,

    pub endpoint: String,

    /// Failure kind (`Timeout`, `HTTPStatus(403)`, ...)
    pub kind: String,

    /// Human-readable detail
    #[serde(default)]
    pub detail: String,

    pub timestamp: DateTime<Utc>,
}

/// Append-only JSON-lines error log.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a classified failure for a source.
    ///
    /// Write failures are logged, not returned.
    pub async fn record(&self, source: &SourceDescriptor, kind: FailureKind, detail: &str) {
        self.record_event(&source.name, &source.url, kind, detail).await;
    }

    /// Record a failure not tied to a configured source, such as the legacy
    /// store or a snapshot file. `endpoint` names the path involved.
    pub async fn record_event(
        &self,
        source: &str,
        endpoint: &str,
        kind: FailureKind,
        detail: &str,
    ) {
        let entry = ErrorEntry {
            source: source.to_string(),
            endpoint: endpoint.to_string(),
            kind: kind.to_string(),
            detail: detail.to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.append(&entry).await {
            log::error!(
                "Failed to write error log {:?} for {}: {}",
                self.path,
                source,
                e
            );
        }
    }

    /// Append one entry.
    pub async fn append(&self, entry: &ErrorEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        ensure_parent(&self.path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await
    }

    /// Read every well-formed entry; malformed lines are skipped.
    pub async fn read_all(&self) -> std::io::Result<Vec<ErrorEntry>> {
        let _guard = self.lock.lock().await;
        let Some(bytes) = read_optional(&self.path).await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&bytes);
        Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::debug!("Skipping malformed error log line: {}", e);
                    None
                }
            })
            .collect())
    }
}
