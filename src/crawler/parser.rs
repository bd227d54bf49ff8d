//! HTML parsing and link extraction
//!
//! Documents are parsed with scraper (html5ever) into a node tree. Link
//! extraction walks that tree in document order and harvests the `href` of
//! every `<a>` element.

use crate::url::{resolve_link, PageUrl};
use scraper::{Html, Node};
use thiserror::Error;

/// Reasons a fetched body is not treated as an HTML document
///
/// A page that fails to parse contributes zero links.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Document is empty")]
    Empty,

    #[error("Document contains binary content")]
    Binary,
}

/// Parses page content into an HTML document tree
///
/// html5ever recovers from any malformed markup, so only content that is not
/// text at all is rejected: an empty (or whitespace-only) body, or one
/// containing NUL bytes.
///
/// # Example
///
/// ```
/// use webcrawler::crawler::parse_document;
///
/// assert!(parse_document("<p>hello</p>").is_ok());
/// assert!(parse_document("").is_err());
/// ```
pub fn parse_document(content: &str) -> Result<Html, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if content.contains('\0') {
        return Err(ParseError::Binary);
    }
    Ok(Html::parse_document(content))
}

/// Extracts every followable link from `document`
///
/// Links are returned in document order, resolved against `base` and
/// normalized. `<a>` elements carrying a `download` attribute are skipped, as
/// is any `href` that does not resolve to an absolute http(s) URL. Duplicates
/// are kept; deduplication is the frontier's job.
///
/// # Arguments
///
/// * `document` - The parsed page
/// * `base` - URL of the page, used for resolving relative links
pub fn extract_links(document: &Html, base: &PageUrl) -> Vec<String> {
    let mut links = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Element(element) = node.value() else {
            continue;
        };
        if element.name() != "a" || element.attr("download").is_some() {
            continue;
        }

        if let Some(link) = element.attr("href").and_then(|href| resolve_link(href, base)) {
            links.push(link.as_str().to_string());
        }
    }

    links
}
