//! Hacker News front page scraper.
//!
//! Every story title is a `span.titleline` whose first link is either an
//! external absolute URL or a relative `item?id=…` discussion link.

use super::{CandidateStream, ScrapeContext, element_text, fetch_page, first, href, selector, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::{base_url, resolve_against_host};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, warn};

static TITLE_LINE: Lazy<Selector> = Lazy::new(|| selector("span.titleline"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, _tags: &'a [Tag]) -> CandidateStream<'a> {
    let Some(base) = base_url(&source.url) else {
        warn!(url = %source.url, "Hacker News source URL has no host");
        return stream::empty().boxed();
    };

    sequential(std::iter::once(base), move |base| async move {
        let Some(html) = fetch_page(ctx, &source.url, Decoding::Declared).await else {
            return Vec::new();
        };
        let candidates = parse(&html, &base);
        info!(count = candidates.len(), "Scraped Hacker News front page");
        candidates
    })
}

pub fn parse(html: &str, base: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    document
        .select(&TITLE_LINE)
        .filter_map(|span| {
            let link = first(&span, &LINK)?;
            let href = href(&link)?;
            Some(RawCandidate::new(
                element_text(&link),
                resolve_against_host(base, href),
            ))
        })
        .collect()
}
