use crate::UrlError;
use url::Url;

/// Query parameters that only carry tracking information
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes an absolute URL into the form used for deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or relative
/// 2. Accept only http and https
/// 3. Lowercase the host (default ports are dropped by the parser)
/// 4. Normalize the path:
///    - Remove dot segments (. and ..) and empty segments
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove the fragment
/// 6. Remove tracking query parameters (`utm_*`, `fbclid`, `gclid`, `mc_eid`)
/// 7. Sort the remaining query parameters by key
/// 8. Remove an empty query string
///
/// # Examples
///
/// ```
/// use webcrawler::url::normalize_url;
///
/// let url = normalize_url("http://A.TEST/page/?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "http://a.test/page?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {
            let lowered = host.to_lowercase();
            if lowered != host {
                url.set_host(Some(&lowered))
                    .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
            }
        }
        _ => return Err(UrlError::MissingHost),
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
