//! Result Identity
//!
//! Synthesizes result ids of the form `{source}-{upstreamKey}-{index}`:
//! - `upstreamKey` is the provider's own id when it has one
//! - otherwise a short SHA-256 digest of the canonical URL and title
//!
//! Ids depend only on upstream content and position, never on the clock.

use sha2::{Digest, Sha256};
use url::Url;

/// Hex characters of the digest kept in a synthesized key
const SHORT_DIGEST_LEN: usize = 12;

/// Query parameters that never identify content
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
];

/// Computes the SHA-256 hex digest of `content`
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalizes a URL for hashing
///
/// Drops the fragment and tracking parameters, sorts the remaining query
/// parameters and lowercases scheme and host. Unparseable input is returned
/// trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };

    url.set_fragment(None);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    url.set_query(None);
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }

    // `Url` already lowercases scheme and host
    url.to_string()
}

/// Builds a result id that is unique within one source's page
pub fn synthesize_id(
    source: &str,
    upstream_key: Option<&str>,
    url: &str,
    title: &str,
    index: usize,
) -> String {
    let key = match upstream_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => key.to_string(),
        None => {
            let digest = compute_hash(&format!("{}\n{}", canonicalize_url(url), title.trim()));
            digest[..SHORT_DIGEST_LEN].to_string()
        }
    };
    format!("{}-{}-{}", source, key, index)
}

/// `scheme://host[:port]` of a URL, used as a publisher's homepage
pub fn origin_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Host of a URL without a leading `www.`
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?;
    Some(host.trim_start_matches("www.").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash("wygrzeb");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_hash("wygrzeb"));
        assert_ne!(hash, compute_hash("Wygrzeb"));
    }

    #[test]
    fn test_canonicalize_url_strips_tracking() {
        let a = canonicalize_url("https://Example.COM/a?b=2&utm_source=x&a=1#frag");
        let b = canonicalize_url("https://example.com/a?a=1&b=2");
        assert_eq!(a, b);
        assert_eq!(canonicalize_url("  not a url "), "not a url");
    }

    #[test]
    fn test_synthesize_id_prefers_upstream_key() {
        assert_eq!(
            synthesize_id("twitter", Some("1789"), "https://x.com/i/1789", "t", 3),
            "twitter-1789-3"
        );
    }

    #[test]
    fn test_synthesize_id_is_deterministic_without_key() {
        let first = synthesize_id("newsapi", None, "https://tvn24.pl/a?utm_medium=rss", "Title", 0);
        let second = synthesize_id("newsapi", Some("  "), "https://tvn24.pl/a", "Title", 0);
        assert_eq!(first, second);
        assert!(first.starts_with("newsapi-"));
        assert!(first.ends_with("-0"));
        assert_eq!(first.len(), "newsapi-".len() + SHORT_DIGEST_LEN + "-0".len());
    }

    #[test]
    fn test_synthesize_id_distinguishes_position() {
        let a = synthesize_id("newsapi", None, "https://a.pl", "Same", 0);
        let b = synthesize_id("newsapi", None, "https://a.pl", "Same", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_origin_and_host() {
        assert_eq!(
            origin_of("https://www.rp.pl/kraj/art123?x=1").as_deref(),
            Some("https://www.rp.pl")
        );
        assert_eq!(
            origin_of("http://127.0.0.1:8080/x").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert_eq!(host_of("https://www.rp.pl/kraj").as_deref(), Some("rp.pl"));
        assert_eq!(origin_of("garbage"), None);
    }
}
