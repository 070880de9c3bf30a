//! Per-source extraction strategies and the feed scraper that drives them.
//!
//! Each submodule knows one third-party page structure or API. They all
//! expose the same two entry points:
//!
//! - `scrape(ctx, source, tags)`: issue the source's requests, one after the
//!   other, and yield [`RawCandidate`]s lazily as a stream
//! - `parse*(…)`: the synchronous extraction from a fetched body, kept apart
//!   so that no `scraper::Html` is ever held across an `.await`
//!
//! # Supported Sources
//!
//! | Slug | Module | Method | Cap |
//! |------|--------|--------|-----|
//! | `cert-fr` | [`cert_fr`] | HTML, three fixed sections | none |
//! | `cve-details` | [`cve_details`] | HTML search per tag | 10 per tag |
//! | `debian` | [`debian`] | HTML, current year's DSA list | first 10 entries |
//! | `drupal` | [`drupal`] | HTML, `views-row` cards | none |
//! | `exploit-db` | [`exploit_db`] | bulk CSV export | 10 newest per tag |
//! | `hackernews` | [`hackernews`] | HTML front page | none |
//! | `nist-nvd` | [`nist_nvd`] | NVD JSON API, two calls per tag | 10 per tag |
//! | `packetstorm` | [`packetstorm`] | HTML search per tag | none |
//! | `thehackernews` | [`thehackernews`] | HTML front page | none |
//! | `ubuntu` | [`ubuntu`] | HTML notices | none |
//!
//! A failed request is logged and contributes nothing; it never ends the
//! stream or the job. Items whose markup is missing a piece are skipped.

use crate::config::{Config, Endpoints};
use crate::fetcher::{Decoding, FetchAsync, FetchError, Fetcher};
use crate::models::{Candidate, Feed, RawCandidate, Source, Tag};
use crate::normalize::normalize;
use crate::utils::collapse_whitespace;
use futures::stream::{self, BoxStream, StreamExt};
use scraper::{ElementRef, Selector};
use serde::de::DeserializeOwned;
use std::future::{Future, ready};
use tracing::{debug, error, info, instrument};

pub mod cert_fr;
pub mod cve_details;
pub mod debian;
pub mod drupal;
pub mod exploit_db;
pub mod hackernews;
pub mod nist_nvd;
pub mod packetstorm;
pub mod thehackernews;
pub mod ubuntu;

/// A finite, single-pass stream of scrape results.
pub type CandidateStream<'a, T = RawCandidate> = BoxStream<'a, T>;

/// Everything a strategy needs besides the source and its tags.
#[derive(Debug)]
pub struct ScrapeContext {
    pub fetcher: Fetcher,
    pub endpoints: Endpoints,
}

impl ScrapeContext {
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: Fetcher::from_config(&config.http)?,
            endpoints: config.endpoints.clone(),
        })
    }
}

/// The registered extraction strategies, one per supported source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CertFr,
    CveDetails,
    Debian,
    Drupal,
    ExploitDb,
    HackerNews,
    NistNvd,
    PacketStorm,
    TheHackerNews,
    Ubuntu,
}

impl Strategy {
    pub const ALL: [Strategy; 10] = [
        Strategy::CertFr,
        Strategy::CveDetails,
        Strategy::Debian,
        Strategy::Drupal,
        Strategy::ExploitDb,
        Strategy::HackerNews,
        Strategy::NistNvd,
        Strategy::PacketStorm,
        Strategy::TheHackerNews,
        Strategy::Ubuntu,
    ];

    /// Registry key: the source slug with non-alphanumerics turned into `_`.
    pub fn key(&self) -> &'static str {
        match self {
            Strategy::CertFr => "cert_fr",
            Strategy::CveDetails => "cve_details",
            Strategy::Debian => "debian",
            Strategy::Drupal => "drupal",
            Strategy::ExploitDb => "exploit_db",
            Strategy::HackerNews => "hackernews",
            Strategy::NistNvd => "nist_nvd",
            Strategy::PacketStorm => "packetstorm",
            Strategy::TheHackerNews => "thehackernews",
            Strategy::Ubuntu => "ubuntu",
        }
    }

    /// Resolve a source slug to its strategy. Unknown slugs resolve to `None`.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let key = registry_key(slug);
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    /// Run the strategy against `source` for the given interest tags.
    pub fn scrape<'a>(
        self,
        ctx: &'a ScrapeContext,
        source: &'a Source,
        tags: &'a [Tag],
    ) -> CandidateStream<'a> {
        match self {
            Strategy::CertFr => cert_fr::scrape(ctx, source, tags),
            Strategy::CveDetails => cve_details::scrape(ctx, source, tags),
            Strategy::Debian => debian::scrape(ctx, source, tags),
            Strategy::Drupal => drupal::scrape(ctx, source, tags),
            Strategy::ExploitDb => exploit_db::scrape(ctx, source, tags),
            Strategy::HackerNews => hackernews::scrape(ctx, source, tags),
            Strategy::NistNvd => nist_nvd::scrape(ctx, source, tags),
            Strategy::PacketStorm => packetstorm::scrape(ctx, source, tags),
            Strategy::TheHackerNews => thehackernews::scrape(ctx, source, tags),
            Strategy::Ubuntu => ubuntu::scrape(ctx, source, tags),
        }
    }
}

fn registry_key(slug: &str) -> String {
    slug.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Scrape one feed: run its source's strategy and normalize every result.
///
/// A feed without a source, or whose source has no registered strategy,
/// yields an empty stream.
#[instrument(level = "info", skip_all, fields(feed_id = feed.id))]
pub fn scrape_feed<'a>(ctx: &'a ScrapeContext, feed: &'a Feed) -> CandidateStream<'a, Candidate> {
    let Some(source) = feed.source.as_ref() else {
        debug!("Feed has no source; nothing to scrape");
        return stream::empty().boxed();
    };
    let Some(strategy) = Strategy::from_slug(&source.slug) else {
        info!(slug = %source.slug, "No strategy registered for source; nothing to scrape");
        return stream::empty().boxed();
    };

    debug!(slug = %source.slug, ?strategy, tags = feed.tags.len(), "Scraping feed");
    let feed_id = feed.id;
    let source_id = source.id;
    strategy
        .scrape(ctx, source, &feed.tags)
        .filter_map(move |raw| ready(normalize(raw, feed_id, source_id)))
        .boxed()
}

/// Run `step` for each item in order and flatten the produced batches.
///
/// The next request is only issued once the consumer has drained the
/// previous batch.
pub(crate) fn sequential<'a, I, F, Fut>(items: I, step: F) -> CandidateStream<'a>
where
    I: IntoIterator + 'a,
    I::IntoIter: Send + 'a,
    I::Item: Send + 'a,
    F: FnMut(I::Item) -> Fut + Send + 'a,
    Fut: Future<Output = Vec<RawCandidate>> + Send + 'a,
{
    stream::iter(items).then(step).flat_map(stream::iter).boxed()
}

/// Fetch a page for a strategy. Failures are logged and yield `None`.
pub(crate) async fn fetch_page(
    ctx: &ScrapeContext,
    url: &str,
    decoding: Decoding,
) -> Option<String> {
    match ctx.fetcher.fetch(url, decoding).await {
        Ok(page) => {
            debug!(%url, status = page.status, bytes = page.body.len(), "Source page fetched");
            Some(page.body)
        }
        Err(e) => {
            error!(%url, error = %e, "Source fetch failed; skipping");
            None
        }
    }
}

/// Fetch and decode a JSON document for a strategy. Failures yield `None`.
pub(crate) async fn fetch_json<D: DeserializeOwned>(ctx: &ScrapeContext, url: &str) -> Option<D> {
    match ctx.fetcher.get_json(url).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(%url, error = %e, "Source API call failed; skipping");
            None
        }
    }
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid static selector {css:?}: {e}"))
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// First descendant of `element` matching `selector`.
pub(crate) fn first<'a>(element: &ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    element.select(selector).next()
}

/// `href` of an element, if present and non-empty.
pub(crate) fn href<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    element
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|h| !h.is_empty())
}
