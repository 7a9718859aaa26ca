// src/utils/url.rs

//! URL manipulation utilities.

/// Extract domain from a URL.
///
/// # Examples
/// ```
/// use catalog_tracker::utils::url::get_domain;
///
/// assert_eq!(
///     get_domain("http://Lists.Example.COM:8080/get.php"),
///     Some("lists.example.com".to_string())
/// );
/// ```
pub fn get_domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// Short label for a server, used when a source has no name.
///
/// Drops a leading `www.` and keeps the first host label.
///
/// # Examples
/// ```
/// use catalog_tracker::utils::url::host_label;
///
/// assert_eq!(host_label("https://www.alpha-tv.net/list.m3u"), Some("alpha-tv".to_string()));
/// ```
pub fn host_label(url: &str) -> Option<String> {
    let domain = get_domain(url)?;
    let domain = domain.strip_prefix("www.").unwrap_or(&domain);
    domain
        .split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

/// Remove query string and fragment from a URL.
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}
