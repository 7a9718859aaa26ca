//! Catalog item data structure.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator of the canonical string form.
const SEPARATOR: &str = " | ";

/// One normalized catalog entry.
///
/// Items compare by value. The canonical form `category | name | key` is
/// how items are stored in shards and referenced by `first_seen`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CatalogItem {
    /// Group label
    pub category: String,

    /// Display name
    pub name: String,

    /// Stream identifier used for diffing
    pub key: String,
}

impl CatalogItem {
    /// Create an item, collapsing whitespace and replacing `|` in every field.
    pub fn new(category: &str, name: &str, key: &str) -> Self {
        Self {
            category: clean_field(category),
            name: clean_field(name),
            key: clean_field(key),
        }
    }

    /// Canonical `category | name | key` form.
    pub fn canonical(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.category, self.name, self.key
        )
    }

    /// Parse the canonical form.
    ///
    /// Category is taken up to the first separator, key after the last one;
    /// the remainder is the name. Returns `None` without two separators.
    pub fn parse_canonical(value: &str) -> Option<Self> {
        let (category, rest) = value.split_once(SEPARATOR)?;
        let (name, key) = rest.rsplit_once(SEPARATOR)?;
        Some(Self::new(category, name, key))
    }
}

fn clean_field(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "/")
}

impl fmt::Display for CatalogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} <{}>", self.category, self.name, self.key)
    }
}

impl From<CatalogItem> for String {
    fn from(item: CatalogItem) -> Self {
        item.canonical()
    }
}

impl TryFrom<String> for CatalogItem {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse_canonical(&value).ok_or_else(|| format!("not a catalog item: {value:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cleans_fields() {
        let item = CatalogItem::new("  Movies ", "Batman |  Returns", "123.ts");
        assert_eq!(item.category, "Movies");
        assert_eq!(item.name, "Batman / Returns");
    }

    #[test]
    fn test_canonical_roundtrip() {
        let item = CatalogItem::new("Sports", "Match - A vs B", "998.m3u8");
        assert_eq!(item.canonical(), "Sports | Match - A vs B | 998.m3u8");
        assert_eq!(CatalogItem::parse_canonical(&item.canonical()), Some(item));
    }

    #[test]
    fn test_parse_canonical_rejects_plain_text() {
        assert_eq!(CatalogItem::parse_canonical("just a name"), None);
    }

    #[test]
    fn test_serde_as_string() {
        let item = CatalogItem::new("News", "Channel 1", "1.ts");
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(json, "\"News | Channel 1 | 1.ts\"");
        let back: CatalogItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_value_equality() {
        let a = CatalogItem::new("News", "Channel 1", "1.ts");
        let b = CatalogItem::new("News", "Channel  1", "1.ts");
        assert_eq!(a, b);
    }
}
