//! Debian security advisories scraper.
//!
//! Reads the advisory index for the current year (`{url}{year}`) and keeps
//! the Debian Security Advisories among its first ten `strong` entries.

use super::{CandidateStream, ScrapeContext, element_text, fetch_page, first, href, selector, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::with_trailing_slash;
use chrono::{Datelike, Local};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

/// Entries inspected on the year page.
pub const MAX_ENTRIES: usize = 10;
/// Link text prefix of a Debian Security Advisory.
pub const ADVISORY_PREFIX: &str = "DSA";

static STRONG: Lazy<Selector> = Lazy::new(|| selector("strong"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, _tags: &'a [Tag]) -> CandidateStream<'a> {
    let year = Local::now().year();
    sequential(std::iter::once(year), move |year| async move {
        let (page_url, link_base) = year_urls(&source.url, year);
        let Some(html) = fetch_page(ctx, &page_url, Decoding::Declared).await else {
            return Vec::new();
        };
        let candidates = parse(&html, &link_base);
        info!(count = candidates.len(), year, "Scraped Debian advisories");
        candidates
    })
}

/// Index page of `year` and the base its relative links resolve against.
pub fn year_urls(source_url: &str, year: i32) -> (String, String) {
    let root = with_trailing_slash(source_url);
    (format!("{root}{year}"), format!("{root}{year}/"))
}

/// Extract advisories from a year index page.
pub fn parse(html: &str, link_base: &str) -> Vec<RawCandidate> {
    let Ok(base) = Url::parse(link_base) else {
        debug!(%link_base, "Debian link base is not a URL");
        return Vec::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&STRONG)
        .take(MAX_ENTRIES)
        .filter_map(|strong| {
            let link = first(&strong, &LINK)?;
            let title = element_text(&link);
            if !title.starts_with(ADVISORY_PREFIX) {
                return None;
            }
            let url = base.join(href(&link)?).ok()?;
            Some(RawCandidate::new(title, url.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::test_support::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const YEAR_PAGE: &str = r#"<html><body>
        <p><strong>Security Advisories</strong></p>
        <tt>[19 Oct 2026]</tt> <strong><a href="dsa-6001">DSA-6001-1 chromium</a></strong> security update<br>
        <tt>[18 Oct 2026]</tt> <strong><a href="dsa-6000">DSA-6000-1 openssl</a></strong> security update<br>
        <tt>[17 Oct 2026]</tt> <strong><a href="dla-4000">DLA-4000-1 curl</a></strong> security update<br>
        </body></html>"#;

    #[test]
    fn test_year_urls() {
        assert_eq!(
            year_urls("https://www.debian.org/security/", 2026),
            (
                "https://www.debian.org/security/2026".to_string(),
                "https://www.debian.org/security/2026/".to_string()
            )
        );
    }

    #[test]
    fn test_parse_keeps_only_advisories() {
        let candidates = parse(YEAR_PAGE, "https://www.debian.org/security/2026/");
        assert_eq!(
            candidates,
            vec![
                RawCandidate::new(
                    "DSA-6001-1 chromium",
                    "https://www.debian.org/security/2026/dsa-6001"
                ),
                RawCandidate::new(
                    "DSA-6000-1 openssl",
                    "https://www.debian.org/security/2026/dsa-6000"
                ),
            ]
        );
    }

    #[test]
    fn test_parse_inspects_first_ten_entries_only() {
        let mut html = String::new();
        for i in 0..10 {
            html.push_str(&format!("<strong>Header {i}</strong>"));
        }
        html.push_str(r#"<strong><a href="dsa-1">DSA-1-1 late</a></strong>"#);
        assert!(parse(&html, "https://www.debian.org/security/2026/").is_empty());
    }

    #[tokio::test]
    async fn test_scrape_requests_current_year() {
        let year = Local::now().year();
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/security/{year}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(YEAR_PAGE))
            .expect(1)
            .mount(&mock_server)
            .await;

        let ctx = context(&mock_server.uri());
        let source = source("debian", &format!("{}/security/", mock_server.uri()));
        let candidates = collect(scrape(&ctx, &source, &[])).await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].url,
            format!("{}/security/{year}/dsa-6001", mock_server.uri())
        );
    }
}
