//! URL handling module for Site-Crawler
//!
//! This module derives canonical keys (host + path) from crawl URLs and
//! resolves links discovered on a page against that page's host.

mod normalize;

use crate::{UrlError, UrlResult};
use std::fmt;
use url::Url;

// Re-export main functions
pub use normalize::{ensure_scheme, is_relative_link, resolve_link};

/// A page location reduced to the parts that identify a crawl target
///
/// Scheme, query string and fragment are dropped. The host keeps an explicit
/// port when the URL carried one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteLink {
    pub host: String,
    pub path: String,
}

impl SiteLink {
    /// Parses a link into its host and path
    ///
    /// Links without an `http://` or `https://` prefix are read as if they
    /// carried `https://`, so canonical keys parse back to themselves.
    ///
    /// # Examples
    ///
    /// ```
    /// use site_crawler::url::SiteLink;
    ///
    /// let site = SiteLink::parse("https://example.com/search?q=rust").unwrap();
    /// assert_eq!(site.host, "example.com");
    /// assert_eq!(site.path, "/search");
    /// ```
    pub fn parse(link: &str) -> UrlResult<Self> {
        let absolute = ensure_scheme(link)?;
        let url = Url::parse(&absolute).map_err(|e| UrlError::Parse(format!("{}: {}", link, e)))?;

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(UrlError::MissingHost(link.to_string())),
        };

        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            host,
            path: url.path().to_string(),
        })
    }

    /// The canonical key for this site: `host + path`
    pub fn key(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

impl fmt::Display for SiteLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

/// Derives the canonical key of a URL
///
/// Two URLs differing only in scheme or query string share a key and are
/// treated as the same crawl target.
///
/// # Examples
///
/// ```
/// use site_crawler::url::canonical_key;
///
/// assert_eq!(canonical_key("https://google.com/search?q=1").unwrap(), "google.com/search");
/// assert_eq!(canonical_key("http://google.com/search").unwrap(), "google.com/search");
/// ```
pub fn canonical_key(link: &str) -> UrlResult<String> {
    SiteLink::parse(link).map(|site| site.key())
}
