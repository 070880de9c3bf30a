//! Turns raw strategy output into canonical candidates.
//!
//! Every stored URL must be absolute `http(s)`. Strategies that scrape
//! relative links resolve them against the source host with
//! [`resolve_against_host`]; [`normalize`] drops whatever is still not
//! absolute, along with empty titles.

use crate::models::{Candidate, RawCandidate};
use crate::utils::{collapse_whitespace, truncate_chars};
use tracing::debug;
use url::Url;

/// Maximum stored title length, in characters.
pub const MAX_TITLE_CHARS: usize = 256;

/// `scheme://host[:port]` of `url`, without a trailing slash.
pub fn base_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Whether `url` parses as an absolute `http` or `https` URL with a host.
pub fn is_absolute_http(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Resolve `href` against a `scheme://host` base.
///
/// Absolute hrefs are returned unchanged, `//host/path` takes the base's
/// scheme, `/path` is appended to the base and any other relative href is
/// joined with a single slash.
pub fn resolve_against_host(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        let scheme = base.split_once("://").map_or("https", |(scheme, _)| scheme);
        format!("{scheme}://{rest}")
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}

/// `url` with exactly one trailing slash.
pub fn with_trailing_slash(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

/// Shape a raw candidate into a [`Candidate`] for `feed_id`/`source_id`.
///
/// Returns `None` when the title is empty after whitespace collapsing or the
/// URL is not absolute.
pub fn normalize(raw: RawCandidate, feed_id: i64, source_id: i64) -> Option<Candidate> {
    let title = truncate_chars(&collapse_whitespace(&raw.title), MAX_TITLE_CHARS);
    if title.is_empty() {
        debug!(url = %raw.url, "Dropping candidate without title");
        return None;
    }

    let url = raw.url.trim().to_string();
    if !is_absolute_http(&url) {
        debug!(%url, %title, "Dropping candidate without absolute URL");
        return None;
    }

    Some(Candidate {
        feed_id,
        source_id,
        tag_id: raw.tag.map(|t| t.id),
        title,
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tag;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base_url() {
        assert_eq!(
            base_url("https://www.cert.ssi.gouv.fr/avis/").as_deref(),
            Some("https://www.cert.ssi.gouv.fr")
        );
        assert_eq!(
            base_url("http://127.0.0.1:8080/search/?q=x").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert_eq!(base_url("www.source.tld"), None);
    }

    #[test]
    fn test_resolve_against_host() {
        let base = "https://news.ycombinator.com";
        assert_eq!(
            resolve_against_host(base, "item?id=1"),
            "https://news.ycombinator.com/item?id=1"
        );
        assert_eq!(
            resolve_against_host(base, "/item?id=1"),
            "https://news.ycombinator.com/item?id=1"
        );
        assert_eq!(
            resolve_against_host(base, "https://example.com/a"),
            "https://example.com/a"
        );
        assert_eq!(
            resolve_against_host("https://ubuntu.com/", "/security/notices/USN-1"),
            "https://ubuntu.com/security/notices/USN-1"
        );
    }

    #[test]
    fn test_resolve_scheme_relative_href() {
        assert_eq!(
            resolve_against_host("https://thehackernews.com", "//cdn.tld/x"),
            "https://cdn.tld/x"
        );
        assert_eq!(
            resolve_against_host("http://127.0.0.1:8080", "//cdn.tld/x?y=1"),
            "http://cdn.tld/x?y=1"
        );
    }

    #[test]
    fn test_with_trailing_slash() {
        assert_eq!(with_trailing_slash("https://a.tld"), "https://a.tld/");
        assert_eq!(with_trailing_slash("https://a.tld/x//"), "https://a.tld/x/");
    }

    #[test]
    fn test_normalize_keeps_tag_and_cleans_title() {
        let tag = Tag {
            id: 7,
            name: "linux".into(),
            slug: "linux".into(),
        };
        let raw = RawCandidate::tagged("  CVE-2024-0001 \n", "https://nvd.nist.gov/vuln/detail/CVE-2024-0001", &tag);
        let candidate = normalize(raw, 3, 4).unwrap();
        assert_eq!(
            candidate,
            Candidate {
                feed_id: 3,
                source_id: 4,
                tag_id: Some(7),
                title: "CVE-2024-0001".into(),
                url: "https://nvd.nist.gov/vuln/detail/CVE-2024-0001".into(),
            }
        );
    }

    #[test]
    fn test_normalize_drops_relative_url() {
        assert!(normalize(RawCandidate::new("Title", "/relative/path"), 1, 1).is_none());
        assert!(normalize(RawCandidate::new("Title", "mailto:a@b.c"), 1, 1).is_none());
    }

    #[test]
    fn test_normalize_drops_empty_title() {
        assert!(normalize(RawCandidate::new(" \n ", "https://a.tld/x"), 1, 1).is_none());
    }

    #[test]
    fn test_normalize_truncates_long_title() {
        let raw = RawCandidate::new("x".repeat(400), "https://a.tld/x");
        let candidate = normalize(raw, 1, 1).unwrap();
        assert_eq!(candidate.title.chars().count(), MAX_TITLE_CHARS);
    }
}
