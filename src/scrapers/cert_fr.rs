//! CERT-FR scraper.
//!
//! Scrapes the three bulletin sections of the French government CERT
//! (`alerte/`, `avis/`, `actualite/`). Each bulletin is a `div.item-title`
//! holding an `h3` link relative to the site root.
//!
//! The site has been seen to misreport its charset, so bodies are always
//! decoded as UTF-8.

use super::{CandidateStream, ScrapeContext, element_text, fetch_page, first, href, selector, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::{base_url, resolve_against_host};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, warn};

/// Sections scraped on every run, in order.
pub const SECTIONS: [&str; 3] = ["alerte", "avis", "actualite"];

static ITEM_TITLE: Lazy<Selector> = Lazy::new(|| selector("div.item-title"));
static H3: Lazy<Selector> = Lazy::new(|| selector("h3"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, _tags: &'a [Tag]) -> CandidateStream<'a> {
    let Some(base) = base_url(&source.url) else {
        warn!(url = %source.url, "CERT-FR source URL has no host");
        return stream::empty().boxed();
    };

    sequential(SECTIONS, move |section| {
        let base = base.clone();
        async move {
            let url = format!("{}/{}/", source.url.trim_end_matches('/'), section);
            let Some(html) = fetch_page(ctx, &url, Decoding::Utf8).await else {
                return Vec::new();
            };
            let candidates = parse(&html, &base);
            info!(count = candidates.len(), %url, "Scraped CERT-FR section");
            candidates
        }
    })
}

/// Extract bulletins from one section page. Links are resolved against `base`.
pub fn parse(html: &str, base: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    document
        .select(&ITEM_TITLE)
        .filter_map(|item| {
            let h3 = first(&item, &H3)?;
            let link = first(&h3, &LINK)?;
            let href = href(&link)?;
            Some(RawCandidate::new(
                element_text(&link),
                resolve_against_host(base, href),
            ))
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

    fn section_page(items: &[(&str, &str)]) -> String {
        let mut html = String::from("<html><body><div class=\"items\">");
        for (href, title) in items {
            html.push_str(&format!(
                "<div class=\"item\"><div class=\"item-title\"><h3><a href=\"{href}\">{title}</a></h3></div></div>"
            ));
        }
        html.push_str("</div></body></html>");
        html
    }

    #[test]
    fn test_parse_resolves_against_host() {
        let html = section_page(&[
            ("/avis/CERTFR-2024-AVI-0001/", "Multiples vulnérabilités dans Linux"),
            ("/avis/CERTFR-2024-AVI-0002/", "Vulnérabilité dans OpenSSL"),
        ]);
        let candidates = parse(&html, "https://www.cert.ssi.gouv.fr");
        assert_eq!(
            candidates,
            vec![
                RawCandidate::new(
                    "Multiples vulnérabilités dans Linux",
                    "https://www.cert.ssi.gouv.fr/avis/CERTFR-2024-AVI-0001/"
                ),
                RawCandidate::new(
                    "Vulnérabilité dans OpenSSL",
                    "https://www.cert.ssi.gouv.fr/avis/CERTFR-2024-AVI-0002/"
                ),
            ]
        );
    }

    #[test]
    fn test_parse_skips_items_without_link() {
        let html = r#"<div class="item-title"><h3>No link here</h3></div>
                      <div class="item-title"><p><a href="/x/">not in h3</a></p></div>"#;
        assert!(parse(html, "https://www.cert.ssi.gouv.fr").is_empty());
    }

    #[tokio::test]
    async fn test_scrape_visits_all_sections() {
        let mock_server = MockServer::start().await;
        for section in SECTIONS {
            let href = format!("/{section}/CERTFR-2024-{}-0001/", section.to_uppercase());
            let title = format!("Bulletin {section}");
            Mock::given(method("GET"))
                .and(path(format!("/{section}/")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(section_page(&[(href.as_str(), title.as_str())])),
                )
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let ctx = context(&mock_server.uri());
        let source = source("cert-fr", &mock_server.uri());
        let candidates = collect(scrape(&ctx, &source, &[])).await;

        let urls: Vec<String> = candidates.iter().map(|c| c.url.clone()).collect();
        assert_eq!(
            urls,
            vec![
                format!("{}/alerte/CERTFR-2024-ALERTE-0001/", mock_server.uri()),
                format!("{}/avis/CERTFR-2024-AVIS-0001/", mock_server.uri()),
                format!("{}/actualite/CERTFR-2024-ACTUALITE-0001/", mock_server.uri()),
            ]
        );
        assert!(candidates.iter().all(|c| c.tag.is_none()));
    }

    #[tokio::test]
    async fn test_failed_section_does_not_stop_others() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alerte/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/avis/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(section_page(&[("/avis/1/", "Avis 1")])))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/actualite/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock_server)
            .await;

        let ctx = context(&mock_server.uri());
        let source = source("cert-fr", &mock_server.uri());
        let candidates = collect(scrape(&ctx, &source, &[])).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Avis 1");
    }
}
