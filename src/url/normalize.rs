use crate::{UrlError, UrlResult};

/// Schemes that never name a fetchable page
const UNFETCHABLE_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "ftp:"];

/// Returns the link with a scheme suitable for fetching
///
/// A link already starting with `http://` or `https://` (in any case) is kept
/// as is; anything else gets `https://` prepended. Links naming a scheme that
/// cannot be fetched are rejected.
///
/// # Examples
///
/// ```
/// use site_crawler::url::ensure_scheme;
///
/// assert_eq!(ensure_scheme("example.com/a").unwrap(), "https://example.com/a");
/// assert_eq!(ensure_scheme("http://example.com/a").unwrap(), "http://example.com/a");
/// ```
pub fn ensure_scheme(link: &str) -> UrlResult<String> {
    let link = link.trim();
    if link.is_empty() {
        return Err(UrlError::Parse("empty link".to_string()));
    }

    let lower = link.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(link.to_string());
    }

    if UNFETCHABLE_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return Err(UrlError::UnsupportedScheme(link.to_string()));
    }

    Ok(format!("https://{}", link))
}

/// Returns true for links that are relative to the page they appear on
pub fn is_relative_link(link: &str) -> bool {
    link.starts_with('/') || link.starts_with("./")
}

/// Resolves a link found on a page against that page's host
///
/// A relative link (`/...` or `./...`) loses a single leading `.` and is
/// appended to `origin_host`; no scheme is added. Anything else is returned
/// unchanged. No de-duplication, fragment stripping or case folding happens
/// here: the canonical key absorbs those differences later.
///
/// # Examples
///
/// ```
/// use site_crawler::url::resolve_link;
///
/// assert_eq!(resolve_link("example.com", "/foo"), "example.com/foo");
/// assert_eq!(resolve_link("example.com", "./bar"), "example.com/bar");
/// assert_eq!(resolve_link("example.com", "http://other.com/x"), "http://other.com/x");
/// ```
pub fn resolve_link(origin_host: &str, link: &str) -> String {
    if is_relative_link(link) {
        let stripped = link.strip_prefix('.').unwrap_or(link);
        return format!("{}{}", origin_host, stripped);
    }
    link.to_string()
}
