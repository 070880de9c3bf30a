//! YAML configuration for the watch service.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Every section uses `#[serde(default)]` so any subset
//! of keys can be given.
//!
//! ```yaml
//! database: /var/lib/hallow_watch/watch.db
//! http:
//!   timeout_secs: 30
//!   max_retries: 1
//! schedule:
//!   interval_secs: 3600
//! tags:
//!   - name: Linux
//! sources:
//!   - name: NIST NVD
//!     slug: nist-nvd
//!     source_type: vulnerability
//!     url: https://nvd.nist.gov/
//! feeds:
//!   - source: nist-nvd
//!     tags: [linux]
//! ```

use crate::models::SourceType;
use crate::utils::slugify;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML in config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite database file.
    pub database: String,
    pub http: HttpConfig,
    pub schedule: ScheduleConfig,
    pub endpoints: Endpoints,
    /// Catalog applied by the `seed` command.
    pub tags: Vec<TagSeed>,
    pub sources: Vec<SourceSeed>,
    pub feeds: Vec<FeedSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "hallow_watch.db".to_string(),
            http: HttpConfig::default(),
            schedule: ScheduleConfig::default(),
            endpoints: Endpoints::default(),
            tags: Vec::new(),
            sources: Vec::new(),
            feeds: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid YAML → `Err(ConfigError::Parse)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries after the first attempt on transient failures.
    pub max_retries: usize,
    /// First backoff delay; doubles on each further retry.
    pub retry_base_delay_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 1,
            retry_base_delay_ms: 1000,
            user_agent: concat!("hallow_watch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Recurring dispatch settings. Lives for the whole process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    /// Dispatch immediately at startup instead of waiting one interval.
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            run_on_start: true,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Fixed third-party endpoints that do not come from a source's base URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub nvd_api_url: String,
    pub exploit_db_csv_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            nvd_api_url: "https://services.nvd.nist.gov/rest/json/cves/2.0".to_string(),
            exploit_db_csv_url:
                "https://gitlab.com/exploit-database/exploitdb/-/raw/main/files_exploits.csv"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagSeed {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

impl TagSeed {
    pub fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSeed {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    pub url: String,
}

impl SourceSeed {
    pub fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

/// A feed binds one source (by slug) to a set of tags (by slug).
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSeed {
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.database, "hallow_watch.db");
        assert_eq!(config.schedule.interval(), Duration::from_secs(3600));
        assert_eq!(config.http.max_retries, 1);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = Config::from_yaml("  \n").unwrap();
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_yaml(
            r#"
database: /tmp/watch.db
http:
  timeout_secs: 5
schedule:
  interval_secs: 60
  run_on_start: false
"#,
        )
        .unwrap();
        assert_eq!(config.database, "/tmp/watch.db");
        assert_eq!(config.http.timeout(), Duration::from_secs(5));
        assert_eq!(config.http.max_retries, 1);
        assert_eq!(config.schedule.interval(), Duration::from_secs(60));
        assert!(!config.schedule.run_on_start);
        assert_eq!(
            config.endpoints.nvd_api_url,
            "https://services.nvd.nist.gov/rest/json/cves/2.0"
        );
    }

    #[test]
    fn test_catalog() {
        let config = Config::from_yaml(
            r#"
tags:
  - name: Linux
  - name: Open SSL
    slug: openssl
sources:
  - name: NIST NVD
    slug: nist-nvd
    source_type: vulnerability
    url: https://nvd.nist.gov/
  - name: Hacker News
    url: https://news.ycombinator.com/
feeds:
  - source: nist-nvd
    tags: [linux, openssl]
  - source: hacker-news
    active: false
"#,
        )
        .unwrap();
        assert_eq!(config.tags[0].slug(), "linux");
        assert_eq!(config.tags[1].slug(), "openssl");
        assert_eq!(config.sources[0].source_type, SourceType::Vulnerability);
        assert_eq!(config.sources[1].slug(), "hacker-news");
        assert_eq!(config.sources[1].source_type, SourceType::Unset);
        assert_eq!(config.feeds[0].tags, vec!["linux", "openssl"]);
        assert!(config.feeds[0].active);
        assert!(!config.feeds[1].active);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = Config::from_yaml("http: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
