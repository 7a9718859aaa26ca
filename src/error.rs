// src/error.rs

//! Unified error handling for the tracker.
//!
//! Per-source failures are classified into [`TransportError`],
//! [`ContentError`], [`ParseError`] and [`StateError`]; each maps to a
//! [`FailureKind`] that is counted and written to the error log.
//! [`AppError`] covers everything that can abort a command.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Key rule regex failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fetch failed for a source
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Snapshot could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Persisted state could not be read or written
    #[error(transparent)]
    State(#[from] StateError),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Network-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connect or stall timeout fired
    #[error("timed out")]
    Timeout,

    /// Host name could not be resolved
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    /// Connection refused, reset, TLS failure and similar
    #[error("connection failed: {0}")]
    Connect(String),

    /// Server answered with a 4xx/5xx status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Any other request failure reported by the client
    #[error("request failed: {0}")]
    Request(String),
}

/// The server answered, but the body is not a usable catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// Markup document (anti-bot interstitial, login page, error page)
    #[error("blocked: received a markup document")]
    BlockedResponse,

    /// Structured error document, or a link document that is not JSON
    #[error("malformed payload: error document or unreadable structure")]
    MalformedPayload,

    /// Body smaller than the configured floor
    #[error("payload too small ({bytes} bytes)")]
    EmptyPayload { bytes: u64 },

    /// Body exceeded the configured cap
    #[error("payload exceeded {limit} bytes")]
    OversizedPayload { limit: u64 },

    /// Link document of an expiry source names no catalog
    #[error("link document has no catalog link")]
    MissingCatalogLink,
}

/// Failure of one fetch attempt chain for a source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Content(#[from] ContentError),

    /// The run was cancelled while the fetch was in flight
    #[error("cancelled")]
    Cancelled,

    /// Local write of the downloaded payload failed
    #[error("local I/O error: {0}")]
    Io(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(TransportError::Timeout) => FailureKind::Timeout,
            Self::Transport(TransportError::DnsFailure(_)) => FailureKind::DnsFailure,
            Self::Transport(TransportError::Connect(_)) => FailureKind::Connect,
            Self::Transport(TransportError::HttpStatus(code)) => FailureKind::HttpStatus(*code),
            Self::Transport(TransportError::Request(_)) => FailureKind::Request,
            Self::Content(ContentError::BlockedResponse) => FailureKind::BlockedResponse,
            Self::Content(ContentError::MalformedPayload) => FailureKind::MalformedPayload,
            Self::Content(ContentError::EmptyPayload { .. }) => FailureKind::EmptyPayload,
            Self::Content(ContentError::OversizedPayload { .. }) => FailureKind::OversizedPayload,
            Self::Content(ContentError::MissingCatalogLink) => FailureKind::MissingCatalogLink,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Io(_) => FailureKind::Io,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Snapshot parsing failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no recognizable catalog entries")]
    NoRecognizableEntries,
}

impl ParseError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoRecognizableEntries => FailureKind::NoRecognizableEntries,
        }
    }
}

/// Persistence failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A shard exists but cannot be decoded
    #[error("corrupt shard for {source_id}: {message}")]
    CorruptShard { source_id: String, message: String },

    /// The legacy aggregate store could not be migrated
    #[error("legacy migration failed: {0}")]
    MigrationFailure(String),

    /// Reading or writing a shard failed
    #[error("state I/O error: {0}")]
    Io(String),
}

impl StateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::CorruptShard { .. } => FailureKind::CorruptShard,
            Self::MigrationFailure(_) => FailureKind::MigrationFailure,
            Self::Io(_) => FailureKind::Io,
        }
    }
}

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Flat classification used for counters and the durable error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    DnsFailure,
    Connect,
    HttpStatus(u16),
    Request,
    BlockedResponse,
    MalformedPayload,
    EmptyPayload,
    OversizedPayload,
    MissingCatalogLink,
    NoRecognizableEntries,
    CorruptShard,
    MigrationFailure,
    Cancelled,
    Io,
}

impl FailureKind {
    /// Transient failures a later run has a reasonable chance of clearing.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect | Self::HttpStatus(500..=599)
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("Timeout"),
            Self::DnsFailure => f.write_str("DNSFailure"),
            Self::Connect => f.write_str("Connect"),
            Self::HttpStatus(code) => write!(f, "HTTPStatus({code})"),
            Self::Request => f.write_str("Request"),
            Self::BlockedResponse => f.write_str("BlockedResponse"),
            Self::MalformedPayload => f.write_str("MalformedPayload"),
            Self::EmptyPayload => f.write_str("EmptyPayload"),
            Self::OversizedPayload => f.write_str("OversizedPayload"),
            Self::MissingCatalogLink => f.write_str("MissingCatalogLink"),
            Self::NoRecognizableEntries => f.write_str("NoRecognizableEntries"),
            Self::CorruptShard => f.write_str("CorruptShard"),
            Self::MigrationFailure => f.write_str("MigrationFailure"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Io => f.write_str("Io"),
        }
    }
}
