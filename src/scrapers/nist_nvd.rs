//! NIST National Vulnerability Database scraper.
//!
//! Uses the CVE API 2.0 (`endpoints.nvd_api_url`) with two sequential calls
//! per tag:
//!
//! 1. `keywordSearch={tag}&resultsPerPage=0` to read `totalResults`
//! 2. `keywordSearch={tag}&resultsPerPage=10&startIndex=max(0, total-10)`
//!    to read the last page
//!
//! Each CVE links to the NVD detail page under the source's base URL.

use super::{CandidateStream, ScrapeContext, fetch_json, sequential};
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::with_trailing_slash;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

/// Results requested from the last page.
pub const PAGE_SIZE: u64 = 10;

#[derive(Debug, Deserialize)]
pub struct CveSearch {
    #[serde(rename = "totalResults")]
    pub total_results: u64,
    #[serde(default)]
    pub vulnerabilities: Vec<VulnerabilityItem>,
}

#[derive(Debug, Deserialize)]
pub struct VulnerabilityItem {
    pub cve: Cve,
}

#[derive(Debug, Deserialize)]
pub struct Cve {
    pub id: String,
}

/// Offset of the last page of `total` results.
pub fn start_index(total: u64) -> u64 {
    total.saturating_sub(PAGE_SIZE)
}

pub fn count_url(api_url: &str, keyword: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(api_url, &[("keywordSearch", keyword), ("resultsPerPage", "0")])
}

pub fn page_url(api_url: &str, keyword: &str, start: u64) -> Result<Url, url::ParseError> {
    let per_page = PAGE_SIZE.to_string();
    let start = start.to_string();
    Url::parse_with_params(
        api_url,
        &[
            ("keywordSearch", keyword),
            ("resultsPerPage", per_page.as_str()),
            ("startIndex", start.as_str()),
        ],
    )
}

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, tags: &'a [Tag]) -> CandidateStream<'a> {
    sequential(tags, move |tag| async move {
        let api_url = &ctx.endpoints.nvd_api_url;
        let count = match count_url(api_url, &tag.name) {
            Ok(url) => url,
            Err(e) => {
                warn!(%api_url, error = %e, "Cannot build NVD API URL");
                return Vec::new();
            }
        };
        let Some(summary) = fetch_json::<CveSearch>(ctx, count.as_str()).await else {
            return Vec::new();
        };
        if summary.total_results == 0 {
            debug!(tag = %tag.name, "No NVD results");
            return Vec::new();
        }

        let start = start_index(summary.total_results);
        let Ok(page) = page_url(api_url, &tag.name, start) else {
            return Vec::new();
        };
        let Some(results) = fetch_json::<CveSearch>(ctx, page.as_str()).await else {
            return Vec::new();
        };

        let candidates = candidates(&results, &source.url, tag);
        info!(
            count = candidates.len(),
            total = summary.total_results,
            start,
            tag = %tag.name,
            "Scraped NVD keyword search"
        );
        candidates
    })
}

/// Detail-page candidates for one result page, at most [`PAGE_SIZE`].
pub fn candidates(results: &CveSearch, source_url: &str, tag: &Tag) -> Vec<RawCandidate> {
    let root = with_trailing_slash(source_url);
    results
        .vulnerabilities
        .iter()
        .take(PAGE_SIZE as usize)
        .map(|item| {
            RawCandidate::tagged(
                item.cve.id.clone(),
                format!("{root}vuln/detail/{}", item.cve.id),
                tag,
            )
        })
        .collect()
}
