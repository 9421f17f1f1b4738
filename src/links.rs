//! Link helpers shared by the fetch and extraction layers
//!
//! URL validation, relative link resolution, stable source ids and
//! chapter slugs.

use sha2::{Digest, Sha256};
use url::Url;

/// Parses a URL the fetch layer is willing to request
///
/// Only absolute `http`/`https` URLs with a host are accepted.
pub fn parse_absolute_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;

    Some(url)
}

/// Returns true if `raw` is a syntactically valid absolute URL
pub fn is_valid_url(raw: &str) -> bool {
    parse_absolute_url(raw).is_some()
}

/// Resolves a link href against the page it was found on
///
/// Returns None for empty hrefs, fragment-only links, `javascript:`,
/// `mailto:`, `tel:` and `data:` links, and anything that does not end up
/// as an absolute http(s) URL.
pub fn resolve_link(href: &str, base_url: Option<&Url>) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let resolved = match base_url {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };

    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved.to_string())
    } else {
        None
    }
}

/// Derives a stable source id from a link (hex-encoded SHA-256)
pub fn stable_id(link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turns a chapter title into a URL-safe slug
///
/// Lowercases, keeps ASCII alphanumerics and collapses every other run of
/// characters into a single hyphen.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Builds the Referer header value (`scheme://host[:port]`) for a URL
pub fn referer_for(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}://{}:{}", url.scheme(), host, port),
        (Some(host), None) => format!("{}://{}", url.scheme(), host),
        _ => url.scheme().to_string(),
    }
}
