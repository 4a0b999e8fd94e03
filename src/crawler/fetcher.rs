//! Rate-limited HTTP fetcher
//!
//! This module handles all HTTP requests for the pipeline, including:
//! - Building the shared HTTP client with a descriptive user agent
//! - Enforcing a minimum delay between calls of one rate-limit domain
//! - Retrying transient failures with exponential backoff
//! - Reporting exhausted retries as a `FetchFailure` value

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::state::RateCursor;
use reqwest::{redirect::Policy, Client};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Retries were exhausted for a URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to fetch {url} after {attempts} attempt(s): {last_error}")]
pub struct FetchFailure {
    pub url: String,
    pub attempts: u32,
    pub last_error: FetchError,
}

/// Bounded retry schedule
///
/// `max_attempts` counts every attempt, including the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
            multiplier: config.backoff_multiplier.max(1),
        }
    }

    /// Backoff after the `failed_attempts`-th failure: base * multiplier^(n-1)
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor)
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Example
///
/// ```no_run
/// use label_sieve::config::UserAgentConfig;
/// use label_sieve::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher bound to one rate-limit domain
///
/// The cursor lock is held for the whole of `fetch`, including retries, so
/// concurrent callers share a single serialized budget.
#[derive(Debug)]
pub struct Fetcher {
    name: &'static str,
    client: Client,
    cursor: Mutex<RateCursor>,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        name: &'static str,
        client: Client,
        min_delay: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name,
            client,
            cursor: Mutex::new(RateCursor::new(min_delay)),
            retry,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of HTTP requests issued so far, retries included
    pub async fn request_count(&self) -> u32 {
        self.cursor.lock().await.request_count()
    }

    /// Fetches a URL body, pacing and retrying as configured
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return body |
    /// | Any other status | Retry after backoff |
    /// | Timeout / connect / body error | Retry after backoff |
    /// | Attempts exhausted | `FetchFailure` |
    ///
    /// The backoff sleep is followed by the full baseline delay.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchFailure> {
        let mut cursor = self.cursor.lock().await;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(wait) = cursor.time_until_next_request(Instant::now()) {
                tracing::trace!("[{}] waiting {:?} before {}", self.name, wait, url);
                tokio::time::sleep(wait).await;
            }

            cursor.record_request();
            let result = self.attempt(url).await;
            cursor.record_completion(Instant::now());

            match result {
                Ok(body) => {
                    tracing::debug!("[{}] fetched {} ({} bytes)", self.name, url, body.len());
                    return Ok(body);
                }
                Err(error) if attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(
                        "[{}] attempt {}/{} for {} failed: {}; retrying in {:?}",
                        self.name,
                        attempt,
                        self.retry.max_attempts,
                        url,
                        error,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    cursor.record_completion(Instant::now());
                }
                Err(error) => {
                    tracing::warn!(
                        "[{}] giving up on {} after {} attempt(s): {}",
                        self.name,
                        url,
                        attempt,
                        error
                    );
                    return Err(FetchFailure {
                        url: url.to_string(),
                        attempts: attempt,
                        last_error: error,
                    });
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}
