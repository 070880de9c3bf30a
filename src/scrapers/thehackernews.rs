//! The Hacker News (thehackernews.com) scraper.
//!
//! Each post is a `div.body-post` with an `h2` headline and an
//! `a.story-link` that already carries the absolute article URL.
//! Posts with an empty headline are skipped.

use super::{CandidateStream, ScrapeContext, element_text, fetch_page, first, href, selector, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::info;

static POST: Lazy<Selector> = Lazy::new(|| selector("div.body-post"));
static HEADLINE: Lazy<Selector> = Lazy::new(|| selector("h2"));
static STORY_LINK: Lazy<Selector> = Lazy::new(|| selector("a.story-link"));

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, _tags: &'a [Tag]) -> CandidateStream<'a> {
    sequential(std::iter::once(()), move |()| async move {
        let Some(html) = fetch_page(ctx, &source.url, Decoding::Declared).await else {
            return Vec::new();
        };
        let candidates = parse(&html);
        info!(count = candidates.len(), "Scraped The Hacker News");
        candidates
    })
}

pub fn parse(html: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    document
        .select(&POST)
        .filter_map(|post| {
            let title = element_text(&first(&post, &HEADLINE)?);
            if title.is_empty() {
                return None;
            }
            let link = first(&post, &STORY_LINK)?;
            Some(RawCandidate::new(title, href(&link)?))
        })
        .collect()
}
