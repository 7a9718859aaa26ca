//! Snapshot directory audit.
//!
//! Classifies every `.m3u` file by its leading bytes and size, whether or not
//! it follows the snapshot naming scheme (files dropped in by external
//! downloaders are audited too).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::error::ContentError;
use crate::models::{SNAPSHOT_EXTENSION, parse_snapshot_file_name};
use crate::services::sniff;

/// Bytes inspected per file.
const AUDIT_PREFIX_BYTES: u64 = 200;

/// Catalogs below this size are flagged as short.
const SHORT_CATALOG_BYTES: u64 = 1024;

/// Content classification of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditClass {
    /// Catalog header present
    Valid,

    /// Catalog header present but under 1 KiB
    Short,

    /// Markup document (block page, login page)
    Markup,

    /// Structured error document
    ErrorPayload,

    /// Zero bytes
    Empty,

    /// Anything else
    Unknown,
}

impl AuditClass {
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Valid | Self::Short)
    }
}

impl fmt::Display for AuditClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Valid => "valid catalog",
            Self::Short => "short catalog",
            Self::Markup => "markup (blocked/error page)",
            Self::ErrorPayload => "error document",
            Self::Empty => "empty",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Audit line for one file.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub path: PathBuf,

    /// Source identifier, when the name follows the snapshot scheme
    pub source_id: Option<String>,

    pub size: u64,
    pub class: AuditClass,
}

/// Classify a file from its size and leading bytes.
pub fn classify(size: u64, prefix: &[u8]) -> AuditClass {
    if size == 0 {
        return AuditClass::Empty;
    }
    let text = String::from_utf8_lossy(prefix);
    if text.contains("#EXTM3U") {
        if size < SHORT_CATALOG_BYTES {
            return AuditClass::Short;
        }
        return AuditClass::Valid;
    }
    match sniff(prefix) {
        Some(ContentError::BlockedResponse) => AuditClass::Markup,
        Some(_) => AuditClass::ErrorPayload,
        None => AuditClass::Unknown,
    }
}

/// Audit every snapshot-like file in `dir`, sorted by path.
pub async fn audit_dir(dir: &Path) -> std::io::Result<Vec<AuditEntry>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut results = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_snapshot = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SNAPSHOT_EXTENSION));
        if !is_snapshot || !entry.file_type().await?.is_file() {
            continue;
        }

        let size = entry.metadata().await?.len();
        let mut prefix = Vec::new();
        tokio::fs::File::open(&path)
            .await?
            .take(AUDIT_PREFIX_BYTES)
            .read_to_end(&mut prefix)
            .await?;

        let source_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_snapshot_file_name)
            .map(|(id, _)| id);

        results.push(AuditEntry {
            class: classify(size, &prefix),
            path,
            source_id,
            size,
        });
    }
    results.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify() {
        assert_eq!(classify(0, b""), AuditClass::Empty);
        assert_eq!(classify(4096, b"#EXTM3U\n#EXTINF"), AuditClass::Valid);
        assert_eq!(classify(300, b"#EXTM3U\n#EXTINF"), AuditClass::Short);
        assert_eq!(classify(900, b"<!DOCTYPE html>"), AuditClass::Markup);
        assert_eq!(classify(40, br#"{"error":"expired"}"#), AuditClass::ErrorPayload);
        assert_eq!(classify(40, b"PK\x03\x04binary"), AuditClass::Unknown);
    }

    #[tokio::test]
    async fn test_audit_dir() {
        let tmp = TempDir::new().unwrap();
        let mut big = b"#EXTM3U\n".to_vec();
        big.resize(2000, b'x');
        tokio::fs::write(tmp.path().join("Alpha_20260301T120000.000Z.m3u"), &big)
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join("manual.m3u"), b"<html>")
            .await
            .unwrap();
        tokio::fs::write(tmp.path().join("ignored.txt"), b"#EXTM3U")
            .await
            .unwrap();

        let entries = audit_dir(tmp.path()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].class, AuditClass::Valid);
        assert_eq!(entries[0].source_id.as_deref(), Some("Alpha"));
        assert_eq!(entries[1].class, AuditClass::Markup);
        assert_eq!(entries[1].source_id, None);
    }
}
