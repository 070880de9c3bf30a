//! Exploit Database scraper.
//!
//! Downloads the bulk `files_exploits.csv` export once per run, then for each
//! tag keeps the rows whose description contains the tag name
//! (case-insensitive) and emits the ten with the highest exploit id, in
//! ascending id order.
//!
//! Rows must have exactly 17 columns. Quoted fields may contain commas.

use super::{CandidateStream, ScrapeContext, fetch_page, sequential};
use crate::fetcher::Decoding;
use crate::models::{RawCandidate, Source, Tag};
use crate::normalize::base_url;
use futures::stream::{self, StreamExt};
use csv::ReaderBuilder;
use itertools::Itertools;
use tracing::{debug, info, warn};

/// Column count of a well-formed export row.
pub const EXPECTED_COLUMNS: usize = 17;
/// Rows kept per tag.
pub const MAX_ROWS: usize = 10;

const ID_COLUMN: usize = 0;
const DESCRIPTION_COLUMN: usize = 2;

pub fn scrape<'a>(ctx: &'a ScrapeContext, source: &'a Source, tags: &'a [Tag]) -> CandidateStream<'a> {
    if tags.is_empty() {
        return stream::empty().boxed();
    }
    let Some(base) = base_url(&source.url) else {
        warn!(url = %source.url, "Exploit-DB source URL has no host");
        return stream::empty().boxed();
    };

    sequential(std::iter::once(base), move |base| async move {
        let export_url = &ctx.endpoints.exploit_db_csv_url;
        let Some(csv) = fetch_page(ctx, export_url, Decoding::Declared).await else {
            return Vec::new();
        };
        let rows = parse_rows(&csv);
        info!(rows = rows.len(), url = %export_url, "Loaded Exploit-DB export");
        tags.iter()
            .flat_map(|tag| select_for_tag(&rows, tag, &base))
            .collect()
    })
}

/// A well-formed export row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploitRow {
    pub id: u64,
    pub description: String,
}

/// Parse the export, skipping the header and any malformed row.
pub fn parse_rows(csv: &str) -> Vec<ExploitRow> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv.as_bytes());
    reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable export row");
                None
            }
        })
        .filter(|record| record.len() == EXPECTED_COLUMNS)
        .filter_map(|record| {
            let id = record.get(ID_COLUMN)?.trim().parse::<u64>().ok()?;
            let description = record.get(DESCRIPTION_COLUMN)?.trim().trim_matches('"');
            Some(ExploitRow {
                id,
                description: description.to_string(),
            })
        })
        .collect()
}

/// The [`MAX_ROWS`] highest-id rows matching `tag`, ascending by id.
pub fn select_for_tag(rows: &[ExploitRow], tag: &Tag, base: &str) -> Vec<RawCandidate> {
    let needle = tag.name.to_lowercase();
    let matching = rows
        .iter()
        .filter(|row| row.description.to_lowercase().contains(&needle))
        .sorted_by_key(|row| row.id)
        .collect_vec();
    let start = matching.len().saturating_sub(MAX_ROWS);
    matching[start..]
        .iter()
        .map(|row| {
            RawCandidate::tagged(
                row.description.clone(),
                format!("{}/exploits/{}", base.trim_end_matches('/'), row.id),
                tag,
            )
        })
        .collect()
}
