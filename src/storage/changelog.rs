//! Human-readable, append-only change logs.
//!
//! One file per source (`LOG_{source_id}.txt`). Every applied snapshot adds
//! one block:
//!
//! ```text
//! ============================================================
//! [2026-03-02 12:00:00 UTC] snapshot: Alpha_20260302T120000.000Z.m3u
//! ADDED (1)
//!   + [News] Channel 9 <9.ts> (first seen: 2026-03-02)
//! REMOVED (1)
//!   - [News] Channel 2 <2.ts> (first seen: 2026-03-01)
//! ```

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::models::{AnnotatedItem, ChangeKind, ChangeRecord};
use crate::utils::fs::{ensure_parent, read_optional, write_atomic};

/// Width of the block separator line.
const SEPARATOR_WIDTH: usize = 60;

/// Log file prefix.
const LOG_PREFIX: &str = "LOG_";

fn separator() -> String {
    "=".repeat(SEPARATOR_WIDTH)
}

/// Result of deduplicating one log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupeStats {
    /// Blocks found before deduplication
    pub blocks: usize,

    /// Blocks dropped as repeats
    pub removed: usize,
}

/// Writes per-source change logs.
#[derive(Debug, Clone)]
pub struct ChangeLogWriter {
    dir: PathBuf,
}

impl ChangeLogWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Log file of a source.
    pub fn log_path(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("{LOG_PREFIX}{source_id}.txt"))
    }

    /// Append one block for `record`.
    pub async fn append(&self, source_id: &str, record: &ChangeRecord) -> std::io::Result<()> {
        let path = self.log_path(source_id);
        ensure_parent(&path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(render(record).as_bytes()).await?;
        file.flush().await
    }

    /// Deduplicate every log in the directory.
    pub async fn dedupe_all(&self) -> std::io::Result<Vec<(PathBuf, DedupeStats)>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(LOG_PREFIX) && name.ends_with(".txt") {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let stats = dedupe(&path).await?;
            results.push((path, stats));
        }
        Ok(results)
    }
}

/// Render one record as a log block, separator included.
pub fn render(record: &ChangeRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", separator());
    let _ = writeln!(
        out,
        "[{}] snapshot: {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        record.snapshot
    );

    match &record.kind {
        ChangeKind::Baseline { item_count } => {
            let _ = writeln!(out, "BASELINE: {} items", item_count);
        }
        ChangeKind::Delta { added, removed } if added.is_empty() && removed.is_empty() => {
            let _ = writeln!(out, "NO CHANGES");
        }
        ChangeKind::Delta { added, removed } => {
            write_section(&mut out, "ADDED", '+', added);
            write_section(&mut out, "REMOVED", '-', removed);
        }
    }
    out
}

fn write_section(out: &mut String, title: &str, marker: char, items: &[AnnotatedItem]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{} ({})", title, items.len());
    for entry in items {
        let _ = writeln!(
            out,
            "  {} {} (first seen: {})",
            marker,
            entry.item,
            entry.first_seen.format("%Y-%m-%d")
        );
    }
}

/// Drop blocks whose trimmed text repeats an earlier block.
///
/// The file is only rewritten (atomically) when something was removed.
pub async fn dedupe(path: &Path) -> std::io::Result<DedupeStats> {
    let Some(bytes) = read_optional(path).await? else {
        return Ok(DedupeStats::default());
    };
    let text = String::from_utf8_lossy(&bytes);
    let sep = separator();

    let mut preamble = String::new();
    let mut blocks: Vec<String> = Vec::new();
    for line in text.lines() {
        if line.trim_end() == sep {
            blocks.push(String::new());
        } else if let Some(block) = blocks.last_mut() {
            block.push_str(line);
            block.push('\n');
        } else {
            preamble.push_str(line);
            preamble.push('\n');
        }
    }

    let mut seen = HashSet::new();
    let mut output = preamble;
    let mut stats = DedupeStats {
        blocks: blocks.len(),
        removed: 0,
    };
    for block in &blocks {
        let trimmed = block.trim();
        if !seen.insert(trimmed) {
            stats.removed += 1;
            continue;
        }
        output.push_str(&sep);
        output.push('\n');
        if !trimmed.is_empty() {
            output.push_str(trimmed);
            output.push('\n');
        }
    }

    if stats.removed > 0 {
        write_atomic(path, output.as_bytes()).await?;
        log::info!(
            "Removed {} duplicate blocks from {:?}",
            stats.removed,
            path
        );
    }
    Ok(stats)
}
