//! Data models for the watch catalog and the content it discovers.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Source`], [`Tag`], [`Feed`]: the scraping configuration owned by operators
//! - [`RawCandidate`]: what a source strategy extracts from a page
//! - [`Candidate`]: a normalized, unpersisted result bound to its feed
//! - [`Content`]: a stored item, unique by URL across every feed

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a third-party source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    #[serde(rename = "")]
    Unset,
    Exploit,
    Security,
    Technology,
    Vulnerability,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Unset => "",
            SourceType::Exploit => "exploit",
            SourceType::Security => "security",
            SourceType::Technology => "technology",
            SourceType::Vulnerability => "vulnerability",
        }
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(SourceType::Unset),
            "exploit" => Ok(SourceType::Exploit),
            "security" => Ok(SourceType::Security),
            "technology" => Ok(SourceType::Technology),
            "vulnerability" => Ok(SourceType::Vulnerability),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// A third-party site or API. The slug selects the extraction strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub source_type: SourceType,
    /// Base URL handed to the strategy (e.g. `https://services.nvd.nist.gov/`).
    pub url: String,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Keyword used both as a classifier and, for some sources, as a search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A configured scraping target: at most one source plus the tags of interest.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    pub source: Option<Source>,
    pub tags: Vec<Tag>,
    pub active: bool,
    /// Handle of the last dispatched job. Informational only.
    pub last_job_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Feed {
    /// Comma-joined tag names, or `No Tags` for an untagged feed.
    pub fn tag_names(&self) -> String {
        if self.tags.is_empty() {
            "No Tags".to_string()
        } else {
            self.tags
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} ({})", source.name, self.tag_names()),
            None => write!(f, "<no source> ({})", self.tag_names()),
        }
    }
}

/// A result as extracted by a source strategy, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub title: String,
    pub url: String,
    /// The tag whose query produced this result, when the strategy searches per tag.
    pub tag: Option<Tag>,
}

impl RawCandidate {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            tag: None,
        }
    }

    pub fn tagged(title: impl Into<String>, url: impl Into<String>, tag: &Tag) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            tag: Some(tag.clone()),
        }
    }
}

/// A normalized scrape result bound to the feed that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub feed_id: i64,
    pub source_id: i64,
    pub tag_id: Option<i64>,
    pub title: String,
    pub url: String,
}

/// A stored content item. `url` is unique across the whole dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Content {
    pub id: i64,
    pub feed_id: i64,
    pub source_id: i64,
    pub tag_id: Option<i64>,
    pub title: String,
    pub url: String,
    pub viewed: bool,
    pub bookmarked: bool,
    pub created_at: i64,
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
