//! Utility functions and helpers.

pub mod console;
pub mod fs;
pub mod http;
pub mod url;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Characters that are not allowed in file names on common platforms.
const FORBIDDEN_FILE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Turn a display name into a file-system safe identifier.
///
/// Non-ASCII and forbidden characters are dropped, whitespace runs become a
/// single `_`. Returns an empty string when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && !FORBIDDEN_FILE_CHARS.contains(c))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Parse the timestamp formats found in legacy stores and expiry fields.
///
/// RFC 3339 values keep their offset; naive values are read as UTC; a bare
/// date is midnight UTC.
pub fn parse_loose_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}
