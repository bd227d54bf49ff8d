//! URL handling module
//!
//! This module provides the `PageUrl` value type used throughout the crawler,
//! URL normalization, and host extraction.

mod domain;
mod normalize;

use crate::{UrlError, UrlResult};
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

pub use domain::{extract_host, host_of};
pub use normalize::normalize_url;

/// A URL as found in a page or supplied as a seed
///
/// A `PageUrl` keeps the raw text it was built from. When the raw text is a
/// well-formed absolute http(s) URL it also carries the normalized form, which
/// is what equality, hashing and `as_str` use. Relative references become
/// absolute through [`PageUrl::to_absolute`], which returns a new value.
#[derive(Debug, Clone)]
pub struct PageUrl {
    raw: String,
    normalized: Option<Url>,
}

impl PageUrl {
    /// Wraps raw URL text without requiring it to be absolute
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize_url(raw.trim()).ok();
        Self { raw, normalized }
    }

    /// Parses raw URL text that must be a valid absolute http(s) URL
    ///
    /// # Examples
    ///
    /// ```
    /// use webcrawler::url::PageUrl;
    ///
    /// let url = PageUrl::parse("http://a.test/b#frag").unwrap();
    /// assert_eq!(url.as_str(), "http://a.test/b");
    /// assert!(PageUrl::parse("/relative").is_err());
    /// ```
    pub fn parse(raw: impl Into<String>) -> UrlResult<Self> {
        let raw = raw.into();
        let normalized = normalize_url(raw.trim())?;
        Ok(Self {
            raw,
            normalized: Some(normalized),
        })
    }

    /// The text this URL was built from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns true if this is a well-formed absolute http(s) URL
    pub fn is_valid_absolute(&self) -> bool {
        self.normalized.is_some()
    }

    /// Resolves this URL against `base`
    ///
    /// Absolute URLs resolve to themselves. Relative references are joined
    /// onto the base and normalized.
    ///
    /// # Examples
    ///
    /// ```
    /// use webcrawler::url::PageUrl;
    ///
    /// let base = PageUrl::parse("http://a.test/").unwrap();
    /// let link = PageUrl::new("/c").to_absolute(&base).unwrap();
    /// assert_eq!(link.as_str(), "http://a.test/c");
    /// ```
    pub fn to_absolute(&self, base: &PageUrl) -> UrlResult<PageUrl> {
        if self.is_valid_absolute() {
            return Ok(self.clone());
        }

        let base_url = base
            .as_url()
            .ok_or_else(|| UrlError::Malformed(format!("Base URL is not absolute: {}", base.raw)))?;

        let joined = base_url
            .join(self.raw.trim())
            .map_err(|e| UrlError::Parse(e.to_string()))?;

        let normalized = normalize_url(joined.as_str())?;
        Ok(Self {
            raw: self.raw.clone(),
            normalized: Some(normalized),
        })
    }

    /// The normalized string form, or the raw text for invalid URLs
    pub fn as_str(&self) -> &str {
        match &self.normalized {
            Some(url) => url.as_str(),
            None => &self.raw,
        }
    }

    /// The parsed, normalized URL if this URL is absolute
    pub fn as_url(&self) -> Option<&Url> {
        self.normalized.as_ref()
    }

    /// Length of the normalized form in characters
    pub fn len(&self) -> usize {
        self.as_str().chars().count()
    }

    /// Returns true if the URL text is empty
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

/// Resolves an `href` found on the page at `base` into a crawlable URL
///
/// Returns `None` for empty references, same-page fragments, and schemes that
/// are not fetched over HTTP (`javascript:`, `mailto:`, `tel:`, `data:`), as
/// well as for anything that does not resolve to an absolute http(s) URL.
pub fn resolve_link(href: &str, base: &PageUrl) -> Option<PageUrl> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    PageUrl::new(href).to_absolute(base).ok()
}

impl PartialEq for PageUrl {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for PageUrl {}

impl Hash for PageUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
