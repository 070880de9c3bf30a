//! Packet Storm scraper.
//!
//! Runs one file search per tag (`{url}search/?q={tag}&s=files`). Each hit
//! is a `dl` whose first `dt` carries the file link; hits without a link are
//! skipped.

use super::{CandidateStream, ScrapeContext, element_text, fetch_page, first, href, selector, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::{base_url, resolve_against_host, with_trailing_slash};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

static ENTRY: Lazy<Selector> = Lazy::new(|| selector("dl"));
static TERM: Lazy<Selector> = Lazy::new(|| selector("dt"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a"));

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, tags: &'a [Tag]) -> CandidateStream<'a> {
    let Some(base) = base_url(&source.url) else {
        warn!(url = %source.url, "Packet Storm source URL has no host");
        return stream::empty().boxed();
    };

    sequential(tags, move |tag| {
        let base = base.clone();
        async move {
            let url = match search_url(&source.url, &tag.name) {
                Ok(url) => url,
                Err(e) => {
                    warn!(url = %source.url, error = %e, "Cannot build Packet Storm search URL");
                    return Vec::new();
                }
            };
            let Some(html) = fetch_page(ctx, url.as_str(), Decoding::Declared).await else {
                return Vec::new();
            };
            let candidates = parse(&html, &base, tag);
            info!(count = candidates.len(), tag = %tag.name, "Scraped Packet Storm search");
            candidates
        }
    })
}

pub fn search_url(source_url: &str, query: &str) -> Result<Url, url::ParseError> {
    let endpoint = format!("{}search/", with_trailing_slash(source_url));
    Url::parse_with_params(&endpoint, &[("q", query), ("s", "files")])
}

pub fn parse(html: &str, base: &str, tag: &Tag) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    document
        .select(&ENTRY)
        .filter_map(|entry| {
            let term = first(&entry, &TERM)?;
            let link = first(&term, &LINK)?;
            let href = href(&link)?;
            Some(RawCandidate::tagged(
                element_text(&link),
                resolve_against_host(base, href),
                tag,
            ))
        })
        .collect()
}
