use url::Url;

/// Extracts the host from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use webcrawler::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the host from URL text, if it parses
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok().as_ref().and_then(extract_host)
}
