//! Configuration types shared across clients, the cache, and the data service.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DataSource;

/// Request ceilings and backoff multiplier for one network client.
///
/// A ceiling of `0` disables that window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum requests in any trailing 60 seconds.
    pub requests_per_minute: u32,
    /// Maximum requests in any trailing hour.
    pub requests_per_hour: u32,
    /// Maximum requests in any trailing 24 hours.
    pub requests_per_day: u32,
    /// Advertised burst allowance. Reported in stats; not enforced.
    pub burst_limit: u32,
    /// Multiplier applied to the retry delay after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
            requests_per_day: 10_000,
            burst_limit: 10,
            backoff_factor: 1.5,
        }
    }
}

impl RateLimitPolicy {
    /// Enabled `(ceiling, window)` pairs, shortest window first.
    #[must_use]
    pub fn windows(&self) -> Vec<(u32, Duration)> {
        [
            (self.requests_per_minute, Duration::from_secs(60)),
            (self.requests_per_hour, Duration::from_secs(3600)),
            (self.requests_per_day, Duration::from_secs(86_400)),
        ]
        .into_iter()
        .filter(|(limit, _)| *limit > 0)
        .collect()
    }
}

/// Transport configuration for one provider client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL that endpoints are joined onto.
    pub base_url: String,
    /// Optional API key passed to the client's auth scheme.
    pub api_key: Option<String>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay before the first retry.
    pub retry_delay: Duration,
    /// Rate limit policy applied before every attempt.
    pub rate_limit: RateLimitPolicy,
    /// Default headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            rate_limit: RateLimitPolicy::default(),
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `base_url` with default settings otherwise.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (0-based):
    /// `retry_delay * backoff_factor^attempt`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * self.rate_limit.backoff_factor.powi(exp);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("rate_limit", &self.rate_limit)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Cache sizing, expiry, and sweeper settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a caller does not specify one.
    pub default_ttl: Duration,
    /// Maximum number of live entries.
    pub max_size: usize,
    /// Interval between background expiry sweeps.
    pub cleanup_interval: Duration,
    /// How long `stop` waits for the sweeper before aborting it.
    pub shutdown_grace: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_size: 1000,
            cleanup_interval: Duration::from_secs(600),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Orchestration settings for the data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Default TTL for cached current prices.
    pub price_ttl: Duration,
    /// Default TTL for cached history ranges.
    pub history_ttl: Duration,
    /// Maximum age of a stored quote that may stand in for a failed fetch.
    pub store_freshness: Duration,
    /// Provider queried for history.
    pub history_source: DataSource,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            price_ttl: Duration::from_secs(300),
            history_ttl: Duration::from_secs(3600),
            store_freshness: Duration::from_secs(3600),
            history_source: DataSource::CoinGecko,
        }
    }
}
