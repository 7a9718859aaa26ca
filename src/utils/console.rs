// src/utils/console.rs

//! Operator-facing console output with server-style formatting.
//!
//! Diagnostics go through the `log` facade; this module only renders the
//! headers, per-source lines and summaries a CLI run prints.

use std::sync::OnceLock;

use chrono::Local;

/// Whether console output is suppressed
static QUIET: OnceLock<bool> = OnceLock::new();

/// Initialize console output. Only the first call has an effect.
pub fn init(quiet: bool) {
    let _ = QUIET.set(quiet);
}

fn enabled() -> bool {
    !QUIET.get().copied().unwrap_or(false)
}

/// Format a line with a timestamp and tag
fn format_line(tag: &str, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, tag, message)
}

/// Print a header
pub fn header(title: &str) {
    if enabled() {
        let border = "═".repeat(60);
        println!("{}", format_line("INFO", &border));
        println!("{}", format_line("INFO", &format!("  {}", title)));
        println!("{}", format_line("INFO", &border));
    }
}

/// Print a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    if enabled() {
        let msg = format!("[STEP {}/{}] {}", step_num, total, message);
        println!("{}", format_line("INFO", &msg));
    }
}

/// Print a success line
pub fn success(message: &str) {
    if enabled() {
        println!("{}", format_line("INFO", &format!("✓ {}", message)));
    }
}

/// Print a failure line
pub fn failure(message: &str) {
    if enabled() {
        eprintln!("{}", format_line("FAIL", &format!("✗ {}", message)));
    }
}

/// Print a sub-item (indented)
pub fn sub_item(message: &str) {
    if enabled() {
        println!("{}", format_line("INFO", &format!("    {}", message)));
    }
}

/// Print a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    if enabled() {
        println!();
        println!("{}", format_line("INFO", &format!("[SUMMARY] {}", title)));
        for (key, value) in items {
            println!("{}", format_line("INFO", &format!("    {}: {}", key, value)));
        }
    }
}

/// Human-readable byte size.
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
