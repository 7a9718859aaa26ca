//! Source descriptors and source list loading.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::sanitize_file_name;
use crate::utils::url::host_label;

/// One independently fetched catalog endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Normalized identifier used for file names and shard keys
    pub id: String,

    /// Display name
    pub name: String,

    /// Endpoint URL
    pub url: String,

    /// JSON field holding an explicit expiry timestamp, if the payload has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_field: Option<String>,
}

impl SourceDescriptor {
    /// Build a descriptor, deriving the name from the URL host when empty.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into().trim().to_string();
        let mut name = name.into().trim().to_string();
        if name.is_empty() {
            name = host_label(&url).unwrap_or_else(|| "unknown".to_string());
        }
        let id = Self::normalize_id(&name, &url);
        Self {
            id,
            name,
            url,
            expiry_field: None,
        }
    }

    /// Set the embedded expiry field.
    pub fn with_expiry_field(mut self, field: impl Into<String>) -> Self {
        self.expiry_field = Some(field.into());
        self
    }

    /// Normalize a source name into a stable, file-system safe identifier.
    pub fn normalize_id(name: &str, url: &str) -> String {
        let id = sanitize_file_name(name);
        if !id.is_empty() {
            return id;
        }
        let from_host = host_label(url)
            .map(|h| sanitize_file_name(&h))
            .unwrap_or_default();
        if from_host.is_empty() {
            "source".to_string()
        } else {
            from_host
        }
    }
}

/// Source entry as written in the source list.
#[derive(Debug, Clone, Deserialize)]
struct RawSource {
    #[serde(default, alias = "nome")]
    name: String,

    #[serde(default, alias = "endpoint", alias = "api_url")]
    url: String,

    #[serde(default)]
    expiry_field: Option<String>,
}

/// TOML layout: `[[sources]]` tables.
#[derive(Debug, Deserialize)]
struct TomlSources {
    #[serde(default)]
    sources: Vec<RawSource>,
}

/// Load the ordered source list from a JSON array or a TOML file.
///
/// Entries without a URL and entries whose identifier repeats an earlier
/// one are skipped with a warning.
pub fn load_sources(path: impl AsRef<Path>) -> Result<Vec<SourceDescriptor>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let raw: Vec<RawSource> = if is_toml {
        toml::from_str::<TomlSources>(&content)?.sources
    } else {
        serde_json::from_str(&content)?
    };
    Ok(build_sources(raw))
}

fn build_sources(raw: Vec<RawSource>) -> Vec<SourceDescriptor> {
    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(raw.len());

    for entry in raw {
        if entry.url.trim().is_empty() {
            log::warn!("Skipping source '{}': empty URL", entry.name);
            continue;
        }
        let mut source = SourceDescriptor::new(entry.name, entry.url);
        source.expiry_field = entry.expiry_field.filter(|f| !f.trim().is_empty());

        if !seen.insert(source.id.clone()) {
            log::warn!(
                "Skipping source '{}': identifier '{}' already used",
                source.name,
                source.id
            );
            continue;
        }
        sources.push(source);
    }
    sources
}

/// Check that a source list is usable.
pub fn validate_sources(sources: &[SourceDescriptor]) -> Result<()> {
    if sources.is_empty() {
        return Err(AppError::validation("No sources defined"));
    }
    for source in sources {
        url::Url::parse(&source.url).map_err(|e| {
            AppError::validation(format!("source '{}' has an invalid URL: {e}", source.name))
        })?;
    }
    Ok(())
}
