//! Outbound HTTP with a bounded timeout and retry on transient failures.
//!
//! The module uses a trait-based design:
//! - [`FetchAsync`]: core trait defining an async GET
//! - [`HttpFetch`]: `reqwest` implementation with timeout and User-Agent
//! - [`RetryFetch`]: decorator that retries transient failures of any `FetchAsync`
//!
//! Strategies use the [`Fetcher`] alias, which is the retrying HTTP client.
//!
//! # Retry Strategy
//!
//! - One retry by default (`http.max_retries`)
//! - Transient: connect errors, timeouts, HTTP 5xx and 429
//! - Exponential backoff from `http.retry_base_delay_ms`, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::config::HttpConfig;
use rand::{Rng, rng};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Errors that can occur while fetching a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, body read)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body was not the JSON document the caller expected
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            FetchError::Timeout => true,
            FetchError::HttpStatus(status) => *status >= 500 || *status == 429,
            FetchError::Json(_) => false,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e)
        }
    }
}

/// How the response body is turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    /// Use the charset the server declares, UTF-8 when none is given.
    Declared,
    /// Always decode as UTF-8, for origins that misreport their encoding.
    Utf8,
}

/// A successfully fetched response.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

/// Trait for async page retrieval.
pub trait FetchAsync {
    /// GET `url` and decode the body. Non-2xx statuses are errors.
    async fn fetch(&self, url: &str, decoding: Decoding) -> Result<Page, FetchError>;
}

/// Plain `reqwest` client with the configured timeout and User-Agent.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

impl FetchAsync for HttpFetch {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, decoding: Decoding) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = match decoding {
            Decoding::Utf8 => {
                let bytes = response.bytes().await.map_err(FetchError::from_reqwest)?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Decoding::Declared => response.text().await.map_err(FetchError::from_reqwest)?,
        };

        debug!(status = status.as_u16(), bytes = body.len(), "Fetched page");
        Ok(Page {
            status: status.as_u16(),
            body,
        })
    }
}

/// Wrapper that retries transient failures of any [`FetchAsync`] implementation.
///
/// The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: FetchAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// GET `url` and deserialize the JSON body.
    pub async fn get_json<D: DeserializeOwned>(&self, url: &str) -> Result<D, FetchError> {
        let body = self.fetch(url, Decoding::Utf8).await?.body;
        Ok(serde_json::from_str(&body)?)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchAsync for RetryFetch<T>
where
    T: FetchAsync,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, decoding: Decoding) -> Result<Page, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url, decoding).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt > self.max_retries {
                        warn!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch() giving up"
                        );
                        return Err(e);
                    }

                    let exp = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
                    let delay = self
                        .base_delay
                        .saturating_mul(2u32.saturating_pow(exp))
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// The retrying HTTP client handed to every strategy.
pub type Fetcher = RetryFetch<HttpFetch>;

impl Fetcher {
    pub fn from_config(config: &HttpConfig) -> Result<Self, FetchError> {
        Ok(RetryFetch::new(
            HttpFetch::new(config)?,
            config.max_retries,
            config.retry_base_delay(),
        ))
    }
}

#[cfg(test)]
pub(crate) fn test_fetcher() -> Fetcher {
    let config = HttpConfig {
        timeout_secs: 5,
        max_retries: 1,
        retry_base_delay_ms: 10,
        ..HttpConfig::default()
    };
    Fetcher::from_config(&config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let page = test_fetcher()
            .fetch(&format!("{}/page", mock_server.uri()), Decoding::Declared)
            .await
            .unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<p>hello</p>");
    }

    #[tokio::test]
    async fn test_404_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = test_fetcher()
            .fetch(&format!("{}/missing", mock_server.uri()), Decoding::Declared)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_500_retried_once_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2) // Initial request + 1 retry
            .mount(&mock_server)
            .await;

        let err = test_fetcher()
            .fetch(&format!("{}/flaky", mock_server.uri()), Decoding::Declared)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_503_retry_then_success() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&mock_server)
            .await;

        let page = test_fetcher()
            .fetch(&format!("{}/", mock_server.uri()), Decoding::Declared)
            .await
            .unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "ok");
    }

    #[tokio::test]
    async fn test_utf8_forced_over_declared_charset() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes("Vulnérabilité".as_bytes().to_vec())
                    .insert_header("Content-Type", "text/html; charset=ISO-8859-1"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = test_fetcher();
        let url = format!("{}/avis/", mock_server.uri());
        let forced = fetcher.fetch(&url, Decoding::Utf8).await.unwrap();
        assert_eq!(forced.body, "Vulnérabilité");
        let declared = fetcher.fetch(&url, Decoding::Declared).await.unwrap();
        assert_ne!(declared.body, "Vulnérabilité");
    }

    #[tokio::test]
    async fn test_get_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalResults": 3}"#))
            .mount(&mock_server)
            .await;

        let value: serde_json::Value = test_fetcher()
            .get_json(&mock_server.uri())
            .await
            .unwrap();
        assert_eq!(value["totalResults"], 3);
    }

    #[tokio::test]
    async fn test_invalid_json_is_not_transient() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = test_fetcher()
            .get_json::<serde_json::Value>(&mock_server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Json(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_refused_fails() {
        // Bind then drop a listener to get a port nobody is serving.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = test_fetcher()
            .fetch(&format!("http://{addr}/"), Decoding::Declared)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
