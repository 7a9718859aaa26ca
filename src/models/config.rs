//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP fetch behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Snapshot reuse rules
    #[serde(default)]
    pub cache: CacheConfig,

    /// Catalog parsing and item key policy
    #[serde(default)]
    pub parser: ParserConfig,

    /// File and directory locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.connect_timeout_secs == 0 {
            return Err(AppError::validation("fetch.connect_timeout_secs must be > 0"));
        }
        if self.fetch.stall_timeout_secs == 0 {
            return Err(AppError::validation("fetch.stall_timeout_secs must be > 0"));
        }
        if self.fetch.max_concurrent == 0 {
            return Err(AppError::validation("fetch.max_concurrent must be > 0"));
        }
        if self.fetch.min_payload_bytes >= self.fetch.max_payload_bytes {
            return Err(AppError::validation(
                "fetch.min_payload_bytes must be below fetch.max_payload_bytes",
            ));
        }
        if self.fetch.min_document_bytes >= self.fetch.max_payload_bytes {
            return Err(AppError::validation(
                "fetch.min_document_bytes must be below fetch.max_payload_bytes",
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(AppError::validation("cache.ttl_secs must be > 0"));
        }
        if self.parser.default_category.trim().is_empty() {
            return Err(AppError::validation("parser.default_category is empty"));
        }
        for rule in &self.parser.key_rules {
            Regex::new(&rule.pattern).map_err(|e| {
                AppError::validation(format!("parser.key_rules '{}': {e}", rule.name))
            })?;
        }
        Ok(())
    }
}

/// Request method used for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    /// The method used for the single fallback attempt.
    pub fn alternate(self) -> Self {
        match self {
            Self::Get => Self::Post,
            Self::Post => Self::Get,
        }
    }
}

/// HTTP client and fetch behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// TCP/TLS connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum silence between response chunks in seconds
    #[serde(default = "defaults::stall_timeout")]
    pub stall_timeout_secs: u64,

    /// Maximum concurrent fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Method tried first; the other one is the fallback
    #[serde(default = "defaults::primary_method")]
    pub primary_method: RequestMethod,

    /// Backoff before the fallback attempt in milliseconds
    #[serde(default = "defaults::fallback_delay")]
    pub fallback_delay_ms: u64,

    /// Prefix length inspected for block pages and error documents
    #[serde(default = "defaults::sniff_bytes")]
    pub sniff_bytes: usize,

    /// Payloads below this size are rejected
    #[serde(default = "defaults::min_payload_bytes")]
    pub min_payload_bytes: u64,

    /// Link documents of expiry sources below this size are rejected
    #[serde(default = "defaults::min_document_bytes")]
    pub min_document_bytes: u64,

    /// Payloads above this size are aborted
    #[serde(default = "defaults::max_payload_bytes")]
    pub max_payload_bytes: u64,

    /// Accept self-signed or expired TLS certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            connect_timeout_secs: defaults::connect_timeout(),
            stall_timeout_secs: defaults::stall_timeout(),
            max_concurrent: defaults::max_concurrent(),
            primary_method: defaults::primary_method(),
            fallback_delay_ms: defaults::fallback_delay(),
            sniff_bytes: defaults::sniff_bytes(),
            min_payload_bytes: defaults::min_payload_bytes(),
            min_document_bytes: defaults::min_document_bytes(),
            max_payload_bytes: defaults::max_payload_bytes(),
            accept_invalid_certs: false,
        }
    }
}

/// Snapshot reuse settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Snapshots younger than this are reused
    #[serde(default = "defaults::ttl")]
    pub ttl_secs: u64,

    /// Snapshots smaller than this are never reused
    #[serde(default = "defaults::min_size_bytes")]
    pub min_size_bytes: u64,

    /// Embedded expiry must be at least this far in the future
    #[serde(default = "defaults::expiry_margin")]
    pub expiry_margin_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: defaults::ttl(),
            min_size_bytes: defaults::min_size_bytes(),
            expiry_margin_secs: defaults::expiry_margin(),
        }
    }
}

/// A named URI pattern used to derive item keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRule {
    /// Rule name for diagnostics
    pub name: String,

    /// Regex applied to the URI; capture group 1 (or the whole match) is the key
    pub pattern: String,
}

/// Catalog parsing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Category for entries without a group
    #[serde(default = "defaults::default_category")]
    pub default_category: String,

    /// Ordered key extraction rules, first match wins
    #[serde(default = "defaults::key_rules")]
    pub key_rules: Vec<KeyRule>,

    /// Drop the query string from unmatched URIs before using them as keys
    #[serde(default)]
    pub strip_query_fallback: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            default_category: defaults::default_category(),
            key_rules: defaults::key_rules(),
            strip_query_fallback: false,
        }
    }
}

/// File and directory locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Source list (JSON array or TOML `[[sources]]`)
    #[serde(default = "defaults::sources_file")]
    pub sources_file: PathBuf,

    /// Downloaded snapshot files
    #[serde(default = "defaults::snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Per-source state shards
    #[serde(default = "defaults::state_dir")]
    pub state_dir: PathBuf,

    /// Per-source change logs
    #[serde(default = "defaults::changelog_dir")]
    pub changelog_dir: PathBuf,

    /// JSON-lines failure record
    #[serde(default = "defaults::error_log")]
    pub error_log: PathBuf,

    /// Single-file history store from older installs
    #[serde(default = "defaults::legacy_store")]
    pub legacy_store: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources_file: defaults::sources_file(),
            snapshot_dir: defaults::snapshot_dir(),
            state_dir: defaults::state_dir(),
            changelog_dir: defaults::changelog_dir(),
            error_log: defaults::error_log(),
            legacy_store: defaults::legacy_store(),
        }
    }
}

impl PathsConfig {
    /// Resolve every relative path against `base`.
    pub fn rooted_at(&self, base: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            sources_file: join(&self.sources_file),
            snapshot_dir: join(&self.snapshot_dir),
            state_dir: join(&self.state_dir),
            changelog_dir: join(&self.changelog_dir),
            error_log: join(&self.error_log),
            legacy_store: join(&self.legacy_store),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Print per-source lines while a run is in progress
    #[serde(default = "defaults::show_progress")]
    pub show_progress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            show_progress: defaults::show_progress(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::{KeyRule, RequestMethod};

    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".into()
    }
    pub fn connect_timeout() -> u64 {
        20
    }
    pub fn stall_timeout() -> u64 {
        60
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn primary_method() -> RequestMethod {
        RequestMethod::Get
    }
    pub fn fallback_delay() -> u64 {
        1000
    }
    pub fn sniff_bytes() -> usize {
        512
    }
    pub fn min_payload_bytes() -> u64 {
        2048
    }
    pub fn min_document_bytes() -> u64 {
        16
    }
    pub fn max_payload_bytes() -> u64 {
        200 * 1024 * 1024
    }

    // Cache defaults
    pub fn ttl() -> u64 {
        4 * 60 * 60
    }
    pub fn min_size_bytes() -> u64 {
        5000
    }
    pub fn expiry_margin() -> u64 {
        60
    }

    // Parser defaults
    pub fn default_category() -> String {
        "uncategorized".into()
    }
    pub fn key_rules() -> Vec<KeyRule> {
        vec![
            KeyRule {
                name: "numeric-id-extension".into(),
                pattern: r"(?i)/(\d+\.(?:ts|m3u8|mp4|mkv|avi|flv|mpd))(?:[?#].*)?$".into(),
            },
            KeyRule {
                name: "stream-query".into(),
                pattern: r"(?i)[?&](stream=\d+)(?:[&#].*)?$".into(),
            },
            KeyRule {
                name: "numeric-id-path".into(),
                pattern: r"/(\d+)/?(?:[?#].*)?$".into(),
            },
        ]
    }

    // Path defaults
    pub fn sources_file() -> PathBuf {
        "data/sources.json".into()
    }
    pub fn snapshot_dir() -> PathBuf {
        "data/snapshots".into()
    }
    pub fn state_dir() -> PathBuf {
        "data/state".into()
    }
    pub fn changelog_dir() -> PathBuf {
        "data/changes".into()
    }
    pub fn error_log() -> PathBuf {
        "data/errors.jsonl".into()
    }
    pub fn legacy_store() -> PathBuf {
        "data/history.json".into()
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn show_progress() -> bool {
        true
    }
}
