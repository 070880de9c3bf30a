//! CVE Details scraper.
//!
//! Runs one vulnerability search per tag, using the tag name as the product
//! filter, and keeps the first ten result rows (`tr.srrowns`). The fourth
//! cell of a row holds the CVE link.

use super::{CandidateStream, ScrapeContext, element_text, fetch_page, first, href, selector, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::{base_url, resolve_against_host, with_trailing_slash};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

/// Rows kept per tag.
pub const MAX_ROWS: usize = 10;

static ROW: Lazy<Selector> = Lazy::new(|| selector("tr.srrowns"));
static CELL: Lazy<Selector> = Lazy::new(|| selector("td"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, tags: &'a [Tag]) -> CandidateStream<'a> {
    let Some(base) = base_url(&source.url) else {
        warn!(url = %source.url, "CVE Details source URL has no host");
        return stream::empty().boxed();
    };

    sequential(tags, move |tag| {
        let base = base.clone();
        async move {
            let url = match search_url(&source.url, &tag.name) {
                Ok(url) => url,
                Err(e) => {
                    warn!(url = %source.url, error = %e, "Cannot build CVE Details search URL");
                    return Vec::new();
                }
            };
            let Some(html) = fetch_page(ctx, url.as_str(), Decoding::Declared).await else {
                return Vec::new();
            };
            let candidates = parse(&html, &base, tag);
            info!(count = candidates.len(), tag = %tag.name, "Scraped CVE Details search");
            candidates
        }
    })
}

/// Search URL filtering on `product`.
pub fn search_url(source_url: &str, product: &str) -> Result<Url, url::ParseError> {
    let endpoint = format!("{}vulnerability-search.php", with_trailing_slash(source_url));
    Url::parse_with_params(
        &endpoint,
        &[
            ("f", "1"),
            ("vendor", ""),
            ("product", product),
            ("cveid", ""),
            ("msid", ""),
            ("bidno", ""),
            ("cweid", ""),
            ("cvssscoremin", ""),
            ("cvssscoremax", ""),
            ("psy", ""),
            ("psm", ""),
            ("pey", ""),
            ("pem", ""),
            ("usy", ""),
            ("usm", ""),
            ("uey", ""),
            ("uem", ""),
        ],
    )
}

/// Extract up to [`MAX_ROWS`] results from a search page, tagged with `tag`.
pub fn parse(html: &str, base: &str, tag: &Tag) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    document
        .select(&ROW)
        .take(MAX_ROWS)
        .filter_map(|row| {
            let cell = row.select(&CELL).nth(3)?;
            let link = first(&cell, &LINK)?;
            let href = href(&link)?;
            Some(RawCandidate::tagged(
                element_text(&cell),
                resolve_against_host(base, href),
                tag,
            ))
        })
        .collect()
}
