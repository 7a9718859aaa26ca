// src/services/link.rs

//! Catalog links inside the JSON documents of expiry sources.
//!
//! An expiry source answers with a small JSON document that carries an
//! expiry timestamp and, somewhere, the address of the actual catalog. The
//! link is looked up in order:
//!
//! 1. a well-known field of a top-level object,
//! 2. the first element of a top-level array of strings,
//! 3. any string value, at any depth, that is a URL of a catalog endpoint.

use serde_json::Value;

use crate::error::ContentError;

/// Object fields that hold the catalog address.
const LINK_FIELDS: &[&str] = &["link_m3u", "url", "link", "endereco", "source", "m3u"];

/// URL fragments of catalog endpoints.
const CATALOG_MARKERS: &[&str] = &[".m3u", "get.php", "mpegts"];

/// Find the catalog link in a parsed document.
pub fn catalog_link(document: &Value) -> Option<String> {
    match document {
        Value::Object(map) => {
            let direct = LINK_FIELDS
                .iter()
                .filter_map(|field| map.get(*field))
                .filter_map(Value::as_str)
                .find_map(clean_link);
            if direct.is_some() {
                return direct;
            }
        }
        Value::Array(items) => {
            if let Some(link) = items.first().and_then(Value::as_str).and_then(clean_link) {
                return Some(link);
            }
        }
        _ => return None,
    }

    find_endpoint(document)
}

/// Depth-first search for a string value that is a catalog endpoint URL.
fn find_endpoint(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_link(s).filter(|link| {
            let lower = link.to_ascii_lowercase();
            CATALOG_MARKERS.iter().any(|marker| lower.contains(marker))
        }),
        Value::Array(items) => items.iter().find_map(find_endpoint),
        Value::Object(map) => map.values().find_map(find_endpoint),
        _ => None,
    }
}

/// Parse a stored document and extract its catalog link.
pub fn read_catalog_link(bytes: &[u8]) -> Result<String, ContentError> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|_| ContentError::MalformedPayload)?;
    catalog_link(&document).ok_or(ContentError::MissingCatalogLink)
}

/// Trim quotes and whitespace; only absolute HTTP(S) URLs are links.
fn clean_link(raw: &str) -> Option<String> {
    let link = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .replace("\\/", "/");
    let lower = link.to_ascii_lowercase();
    if (lower.starts_with("http://") || lower.starts_with("https://"))
        && !link.contains(char::is_whitespace)
    {
        Some(link)
    } else {
        None
    }
}
