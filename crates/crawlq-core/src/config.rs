use std::time::Duration;

use crate::error::AppError;

/// Runtime settings shared by the server and the worker pool.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Upper bound on one page load.
    pub max_page_load_timeout: Duration,
    /// Results TTL (seconds) applied when a request does not set one.
    pub default_results_ttl: u64,
    /// How long an idle worker sleeps before polling the queue again.
    pub poll_interval: Duration,
    /// Number of workers in the pool.
    pub workers: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_page_load_timeout: Duration::from_secs(30),
            default_results_ttl: 500,
            poll_interval: Duration::from_millis(1000),
            workers: 1,
        }
    }
}

impl CrawlerConfig {
    /// Read configuration from environment variables.
    ///
    /// - `MAX_PAGE_LOAD_TIMEOUT` (seconds, defaults to 30)
    /// - `DEFAULT_RESULTS_TTL` (seconds, defaults to 500)
    /// - `CRAWLQ_POLL_INTERVAL_MS` (defaults to 1000)
    /// - `CRAWLQ_WORKERS` (defaults to 1)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let timeout_secs = parse_positive(&lookup, "MAX_PAGE_LOAD_TIMEOUT")?
            .unwrap_or(defaults.max_page_load_timeout.as_secs());
        let default_results_ttl =
            parse_positive(&lookup, "DEFAULT_RESULTS_TTL")?.unwrap_or(defaults.default_results_ttl);
        let poll_ms = parse_positive(&lookup, "CRAWLQ_POLL_INTERVAL_MS")?
            .unwrap_or(defaults.poll_interval.as_millis() as u64);

        let workers = match lookup("CRAWLQ_WORKERS") {
            None => defaults.workers,
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid CRAWLQ_WORKERS '{raw}': must be a non-negative integer"
                ))
            })?,
        };

        Ok(Self {
            max_page_load_timeout: Duration::from_secs(timeout_secs),
            default_results_ttl,
            poll_interval: Duration::from_millis(poll_ms),
            workers,
        })
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(AppError::ConfigError(format!("{key} must be at least 1"))),
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(AppError::ConfigError(format!(
            "Invalid {key} '{raw}': must be a positive integer"
        ))),
    }
}
