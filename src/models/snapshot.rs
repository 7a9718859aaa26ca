//! Snapshot file naming.
//!
//! A snapshot is stored as `{source_id}_{timestamp}.m3u`. The file name is the
//! snapshot identifier and the embedded timestamp is the only ordering key.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// Extension of stored snapshots.
pub const SNAPSHOT_EXTENSION: &str = "m3u";

/// Embedded timestamp layout (UTC, millisecond precision).
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// One fetched catalog payload on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub source_id: String,
    pub fetched_at: DateTime<Utc>,
    pub path: PathBuf,
    pub size: u64,
}

impl Snapshot {
    /// Snapshot identifier (the file name).
    pub fn id(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Age relative to `now`, zero for timestamps in the future.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.fetched_at).max(chrono::Duration::zero())
    }
}

/// File name for a snapshot of `source_id` taken at `fetched_at`.
pub fn snapshot_file_name(source_id: &str, fetched_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        source_id,
        fetched_at.format(TIMESTAMP_FORMAT),
        SNAPSHOT_EXTENSION
    )
}

/// Split a snapshot file name into source id and embedded timestamp.
///
/// Returns `None` for temp files, rejected files and anything else that
/// does not follow the naming scheme.
pub fn parse_snapshot_file_name(file_name: &str) -> Option<(String, DateTime<Utc>)> {
    let stem = file_name.strip_suffix(&format!(".{SNAPSHOT_EXTENSION}"))?;
    let (source_id, stamp) = stem.rsplit_once('_')?;
    if source_id.is_empty() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((source_id.to_string(), naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 5, 9).unwrap() + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn test_file_name_layout() {
        assert_eq!(
            snapshot_file_name("Alpha_TV", ts()),
            "Alpha_TV_20260301T080509.042Z.m3u"
        );
    }

    #[test]
    fn test_parse_keeps_underscored_ids() {
        let name = snapshot_file_name("Alpha_TV", ts());
        assert_eq!(
            parse_snapshot_file_name(&name),
            Some(("Alpha_TV".to_string(), ts()))
        );
    }

    #[test]
    fn test_parse_rejects_other_files() {
        assert_eq!(parse_snapshot_file_name("Alpha_20260301T080509.042Z.m3u.tmp"), None);
        assert_eq!(parse_snapshot_file_name("Alpha_20260301T080509.042Z.m3u.rejected"), None);
        assert_eq!(parse_snapshot_file_name("Alpha.m3u"), None);
        assert_eq!(parse_snapshot_file_name("Alpha_yesterday.m3u"), None);
        assert_eq!(parse_snapshot_file_name("notes.txt"), None);
    }

    #[test]
    fn test_underscored_id_is_kept_whole() {
        let name = snapshot_file_name("Alpha_TV", ts());
        assert_eq!(parse_snapshot_file_name(&name), Some(("Alpha_TV".to_string(), ts())));
    }

    #[test]
    fn test_age_never_negative() {
        let snapshot = Snapshot {
            source_id: "a".into(),
            fetched_at: ts(),
            path: PathBuf::from(snapshot_file_name("a", ts())),
            size: 10,
        };
        assert_eq!(snapshot.age(ts() - chrono::Duration::hours(1)), chrono::Duration::zero());
        assert_eq!(snapshot.age(ts() + chrono::Duration::hours(1)), chrono::Duration::hours(1));
        assert_eq!(snapshot.id(), "a_20260301T080509.042Z.m3u");
    }
}
