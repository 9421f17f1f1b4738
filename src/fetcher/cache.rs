//! Response cache keys

use crate::fetcher::{FetchMethod, RequestBody};
use sha2::{Digest, Sha256};

/// Fingerprints a request as hex SHA-256 of the method, URL and serialized body
///
/// Requests to the same URL with a different method or body get different keys.
pub fn cache_key(method: FetchMethod, url: &str, body: Option<&RequestBody>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(url.as_bytes());
    if let Some(body) = body {
        hasher.update(b"\n");
        hasher.update(body.encode().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(page: &str) -> RequestBody {
        RequestBody::Form(vec![
            ("action".to_string(), "madara_load_more".to_string()),
            ("page".to_string(), page.to_string()),
        ])
    }

    #[test]
    fn test_key_depends_on_body() {
        let url = "https://example.com/wp-admin/admin-ajax.php";
        let post = |body: Option<&RequestBody>| cache_key(FetchMethod::Post, url, body);
        assert_eq!(post(Some(&form("1"))), post(Some(&form("1"))));
        assert_ne!(post(Some(&form("1"))), post(Some(&form("2"))));
        assert_ne!(post(None), post(Some(&form("1"))));
    }

    #[test]
    fn test_key_depends_on_method() {
        let url = "https://example.com/manga/one-piece/ajax/chapters/";
        assert_ne!(
            cache_key(FetchMethod::Get, url, None),
            cache_key(FetchMethod::Post, url, None)
        );
    }

    #[test]
    fn test_key_depends_on_url() {
        assert_ne!(
            cache_key(FetchMethod::Get, "https://example.com/a", None),
            cache_key(FetchMethod::Get, "https://example.com/b", None)
        );
        assert_eq!(cache_key(FetchMethod::Get, "https://example.com/a", None).len(), 64);
    }
}
