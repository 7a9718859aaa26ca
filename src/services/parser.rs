// src/services/parser.rs

//! Catalog parser.
//!
//! Reads the line-oriented playlist format (`#EXTINF` metadata line followed
//! by a URI line) into a set of [`CatalogItem`]s. Rules, in order:
//!
//! 1. A leading BOM, `\r`, blank lines and the `#EXTM3U` header are ignored.
//! 2. `#EXTINF` starts a pending entry; `key="value"` pairs are attributes.
//! 3. Category: `group-title`, else a following `#EXTGRP:`, else the default.
//! 4. Name: free text after the last comma outside quotes, else `tvg-name`,
//!    else the metadata line without its `#EXTINF:` prefix.
//! 5. Any other `#` line, and any line that is not a single `scheme://...`
//!    URI, is skipped.
//! 6. A URI line closes the pending entry. A URI without metadata becomes an
//!    item named after the URI; metadata without a URI is dropped.
//! 7. The key is the first key rule match on the URI, else the URI itself.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;

use crate::error::{ParseError, Result};
use crate::models::{CatalogItem, ParserConfig};
use crate::utils::url::strip_query;

const HEADER: &str = "#EXTM3U";
const METADATA_PREFIX: &str = "#EXTINF:";
const GROUP_PREFIX: &str = "#EXTGRP:";
const BOM: char = '\u{feff}';

/// Metadata waiting for its URI line.
#[derive(Debug, Default)]
struct PendingEntry {
    group_title: Option<String>,
    extgrp: Option<String>,
    name: String,
}

/// Compiled catalog parser.
#[derive(Debug, Clone)]
pub struct CatalogParser {
    default_category: String,
    key_rules: Vec<(String, Regex)>,
    strip_query_fallback: bool,
    attr_re: Regex,
    uri_re: Regex,
}

impl CatalogParser {
    /// Compile the parser from configuration.
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let key_rules = config
            .key_rules
            .iter()
            .map(|rule| Ok((rule.name.clone(), Regex::new(&rule.pattern)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            default_category: config.default_category.clone(),
            key_rules,
            strip_query_fallback: config.strip_query_fallback,
            attr_re: Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#)?,
            uri_re: Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://\S+$")?,
        })
    }

    /// Parse raw bytes, replacing invalid UTF-8.
    pub fn parse_bytes(&self, bytes: &[u8]) -> std::result::Result<BTreeSet<CatalogItem>, ParseError> {
        self.parse(&String::from_utf8_lossy(bytes))
    }

    /// Parse catalog text into its item set.
    pub fn parse(&self, text: &str) -> std::result::Result<BTreeSet<CatalogItem>, ParseError> {
        let text = text.strip_prefix(BOM).unwrap_or(text);
        let mut items = BTreeSet::new();
        let mut pending: Option<PendingEntry> = None;

        for line in text.split('\n') {
            let line = line.trim_end_matches('\r').trim();
            if line.is_empty() || line.eq_ignore_ascii_case(HEADER) {
                continue;
            }

            if let Some(rest) = strip_prefix_ci(line, METADATA_PREFIX) {
                if pending.is_some() {
                    log::debug!("Dropping metadata without URI");
                }
                pending = Some(self.read_metadata(rest));
                continue;
            }

            if let Some(group) = strip_prefix_ci(line, GROUP_PREFIX) {
                if let Some(entry) = pending.as_mut() {
                    let group = group.trim();
                    if !group.is_empty() {
                        entry.extgrp = Some(group.to_string());
                    }
                }
                continue;
            }

            if line.starts_with('#') || !self.uri_re.is_match(line) {
                continue;
            }

            let key = self.item_key(line);
            let item = match pending.take() {
                Some(entry) => {
                    let category = entry
                        .group_title
                        .or(entry.extgrp)
                        .unwrap_or_else(|| self.default_category.clone());
                    CatalogItem::new(&category, &entry.name, &key)
                }
                None => CatalogItem::new(&self.default_category, line, &key),
            };
            items.insert(item);
        }

        if items.is_empty() {
            return Err(ParseError::NoRecognizableEntries);
        }
        Ok(items)
    }

    /// Diffing key for a URI.
    pub fn item_key(&self, uri: &str) -> String {
        for (name, re) in &self.key_rules {
            if let Some(caps) = re.captures(uri) {
                if let Some(m) = caps.get(1).or_else(|| caps.get(0)) {
                    if !m.as_str().is_empty() {
                        log::trace!("Key rule '{}' matched {}", name, uri);
                        return m.as_str().to_string();
                    }
                }
            }
        }
        if self.strip_query_fallback {
            strip_query(uri).to_string()
        } else {
            uri.to_string()
        }
    }

    fn read_metadata(&self, rest: &str) -> PendingEntry {
        let attrs: HashMap<String, String> = self
            .attr_re
            .captures_iter(rest)
            .map(|c| (c[1].to_ascii_lowercase(), c[2].trim().to_string()))
            .collect();

        let non_empty = |key: &str| attrs.get(key).filter(|v| !v.is_empty()).cloned();

        let name = trailing_text(rest)
            .or_else(|| non_empty("tvg-name"))
            .unwrap_or_else(|| rest.trim().to_string());

        PendingEntry {
            group_title: non_empty("group-title"),
            extgrp: None,
            name,
        }
    }
}

/// Text after the last comma that is not inside a quoted attribute value.
fn trailing_text(rest: &str) -> Option<String> {
    let mut in_quotes = false;
    let mut last_comma = None;
    for (i, c) in rest.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last_comma = Some(i),
            _ => {}
        }
    }
    let text = rest[last_comma? + 1..].trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyRule;

    fn parser() -> CatalogParser {
        CatalogParser::new(&ParserConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_basic_entry() {
        let text = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"n1\" tvg-name=\"News One\" group-title=\"News\",News One HD\n\
            http://host.example/live/user/pass/1001.ts\n";
        let items = parser().parse(text).unwrap();

        assert_eq!(items.len(), 1);
        let item = items.iter().next().unwrap();
        assert_eq!(item.category, "News");
        assert_eq!(item.name, "News One HD");
        assert_eq!(item.key, "1001.ts");
    }

    #[test]
    fn test_crlf_and_bom() {
        let text = "\u{feff}#EXTM3U\r\n#EXTINF:-1 group-title=\"Kids\",Cartoons\r\nhttp://h/1/2/55.m3u8\r\n";
        let items = parser().parse(text).unwrap();
        let item = items.iter().next().unwrap();
        assert_eq!(item.name, "Cartoons");
        assert_eq!(item.key, "55.m3u8");
    }

    #[test]
    fn test_category_falls_back_to_extgrp_then_default() {
        let text = "#EXTINF:-1,One\n#EXTGRP:Sports\nhttp://h/a/1.ts\n\
            #EXTINF:-1,Two\nhttp://h/a/2.ts\n";
        let items: Vec<_> = parser().parse(text).unwrap().into_iter().collect();
        let one = items.iter().find(|i| i.name == "One").unwrap();
        let two = items.iter().find(|i| i.name == "Two").unwrap();
        assert_eq!(one.category, "Sports");
        assert_eq!(two.category, "uncategorized");
    }

    #[test]
    fn test_name_fallbacks() {
        // Comma inside a quoted attribute is not a separator
        let text = "#EXTINF:-1 tvg-name=\"Movie, The\" group-title=\"Films\",\nhttp://h/m/7.mp4\n\
            #EXTINF:-1 group-title=\"Films\"\nhttp://h/m/8.mp4\n";
        let items: Vec<_> = parser().parse(text).unwrap().into_iter().collect();
        let seven = items.iter().find(|i| i.key == "7.mp4").unwrap();
        let eight = items.iter().find(|i| i.key == "8.mp4").unwrap();
        assert_eq!(seven.name, "Movie, The");
        assert_eq!(eight.name, "-1 group-title=\"Films\"");
    }

    #[test]
    fn test_bare_uri_and_orphan_metadata() {
        let text = "#EXTINF:-1,Orphan\n#EXTINF:-1,Real\n#EXTVLCOPT:http-user-agent=x\nhttp://h/9.ts\nhttp://h/plain/stream\n";
        let items: Vec<_> = parser().parse(text).unwrap().into_iter().collect();
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|i| i.name == "Real" && i.key == "9.ts"));
        assert!(items.iter().any(|i| {
            i.name == "http://h/plain/stream" && i.category == "uncategorized"
        }));
        assert!(!items.iter().any(|i| i.name == "Orphan"));
    }

    #[test]
    fn test_key_rules_strip_volatile_segments() {
        let p = parser();
        assert_eq!(p.item_key("http://h/live/u/TOKEN1/123.ts?t=1"), "123.ts");
        assert_eq!(p.item_key("http://h/live/u/TOKEN2/123.ts?t=2"), "123.ts");
        assert_eq!(p.item_key("http://h/play.php?token=abc&stream=42"), "stream=42");
        assert_eq!(p.item_key("http://h/u/p/987"), "987");
        assert_eq!(p.item_key("http://h/channel/news"), "http://h/channel/news");
    }

    #[test]
    fn test_strip_query_fallback() {
        let config = ParserConfig {
            strip_query_fallback: true,
            ..ParserConfig::default()
        };
        let p = CatalogParser::new(&config).unwrap();
        assert_eq!(p.item_key("http://h/channel/news?sig=xyz"), "http://h/channel/news");
    }

    #[test]
    fn test_custom_rule_without_group_uses_whole_match() {
        let config = ParserConfig {
            key_rules: vec![KeyRule {
                name: "slug".into(),
                pattern: r"[a-z]+-\d+$".into(),
            }],
            ..ParserConfig::default()
        };
        let p = CatalogParser::new(&config).unwrap();
        assert_eq!(p.item_key("http://h/x/news-12"), "news-12");
    }

    #[test]
    fn test_duplicates_collapse() {
        let text = "#EXTINF:-1 group-title=\"A\",X\nhttp://h/t1/1.ts\n#EXTINF:-1 group-title=\"A\",X\nhttp://h/t2/1.ts\n";
        assert_eq!(parser().parse(text).unwrap().len(), 1);
    }

    #[test]
    fn test_no_entries_is_error() {
        assert_eq!(
            parser().parse("#EXTM3U\n#EXTINF:-1,Lonely\n"),
            Err(ParseError::NoRecognizableEntries)
        );
        assert_eq!(
            parser().parse("<html><body>blocked</body></html>"),
            Err(ParseError::NoRecognizableEntries)
        );
        assert_eq!(parser().parse(""), Err(ParseError::NoRecognizableEntries));
    }

    #[test]
    fn test_embedded_links_are_not_entries() {
        let json = "{\n  \"link\": \"http://h/get.php?u=a&p=b\"\n}";
        assert_eq!(parser().parse(json), Err(ParseError::NoRecognizableEntries));

        let html = "<p>Download <a href=\"http://h/x\">here</a></p>\nsee http://h/y for details";
        assert_eq!(parser().parse(html), Err(ParseError::NoRecognizableEntries));
    }

    #[test]
    fn test_markup_cannot_replace_entries() {
        let text = "#EXTM3U\n#EXTINF:-1,Real\nhttp://h/live/7.ts\n<a href=\"http://h/x\">x</a>\n";
        let items: Vec<_> = parser().parse(text).unwrap().into_iter().collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Real");
    }
}
