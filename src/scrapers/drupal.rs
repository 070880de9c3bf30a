//! Drupal security advisories scraper.
//!
//! The advisory listing renders each entry as a `div` whose class list has a
//! `views-row…` token, wrapping a nested `div` with the `h2` title link.

use super::{CandidateStream, ScrapeContext, element_text, fetch_page, first, href, selector, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::{base_url, resolve_against_host};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};

static ROW_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^views-row").unwrap_or_else(|e| panic!("invalid static regex: {e}")));
static CLASSED_DIV: Lazy<Selector> = Lazy::new(|| selector("div[class]"));
static DIV: Lazy<Selector> = Lazy::new(|| selector("div"));
static H2: Lazy<Selector> = Lazy::new(|| selector("h2"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, _tags: &'a [Tag]) -> CandidateStream<'a> {
    let Some(base) = base_url(&source.url) else {
        warn!(url = %source.url, "Drupal source URL has no host");
        return stream::empty().boxed();
    };

    sequential(std::iter::once(base), move |base| async move {
        let Some(html) = fetch_page(ctx, &source.url, Decoding::Declared).await else {
            return Vec::new();
        };
        let candidates = parse(&html, &base);
        info!(count = candidates.len(), url = %source.url, "Scraped Drupal advisories");
        candidates
    })
}

/// Extract advisory cards from the listing page.
pub fn parse(html: &str, base: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    document
        .select(&CLASSED_DIV)
        .filter(|div| div.value().classes().any(|class| ROW_CLASS.is_match(class)))
        .filter_map(|row| {
            let inner = first(&row, &DIV)?;
            let h2 = first(&inner, &H2)?;
            let link = first(&h2, &LINK)?;
            let href = href(&link)?;
            Some(RawCandidate::new(
                element_text(&h2),
                resolve_against_host(base, href),
            ))
        })
        .collect()
}
