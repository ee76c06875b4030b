//! Rate-limited, retrying HTTP transport shared by provider connectors.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tokio::time::Instant;
use url::Url;

use crate::log::{debug, warn};
use crate::connector::ClientStats;
use crate::model::{Payload, ResponseEnvelope};
use crate::rate_limit::RateLimiter;
use cambio_types::{CambioError, ClientConfig, DataSource};

/// Produces authentication headers from the configured API key.
pub trait AuthScheme: Send + Sync {
    /// Headers to add to every request. `api_key` is `None` when none is configured.
    ///
    /// # Errors
    /// Returns `InvalidArg` when the key cannot be encoded as a header value.
    fn auth_headers(&self, api_key: Option<&str>) -> Result<HeaderMap, CambioError>;
}

/// Sends the API key verbatim in a named header.
#[derive(Debug, Clone)]
pub struct ApiKeyHeader {
    name: HeaderName,
}

impl ApiKeyHeader {
    /// Use header `name` for the key.
    #[must_use]
    pub const fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl AuthScheme for ApiKeyHeader {
    fn auth_headers(&self, api_key: Option<&str>) -> Result<HeaderMap, CambioError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| CambioError::InvalidArg(format!("api key header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(self.name.clone(), value);
        }
        Ok(headers)
    }
}

/// One client's HTTP session with rate limiting and retries.
///
/// Every attempt first waits on the rate limiter. Transient failures (network
/// errors, timeouts, 429, 5xx) are retried up to `max_retries` times with
/// exponential backoff; 401/403 short-circuit as `Authentication`.
pub struct HttpClient {
    source: DataSource,
    config: ClientConfig,
    base: Url,
    default_headers: HeaderMap,
    limiter: RateLimiter,
    session: RwLock<Option<reqwest::Client>>,
    auth: Option<Arc<dyn AuthScheme>>,
    request_count: AtomicU64,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("source", &self.source)
            .field("config", &self.config)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

fn header_map(pairs: &BTreeMap<String, String>) -> Result<HeaderMap, CambioError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CambioError::InvalidArg(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| CambioError::InvalidArg(format!("header {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn merge_into(target: &mut HeaderMap, layer: &HeaderMap) {
    for (name, value) in layer {
        target.insert(name.clone(), value.clone());
    }
}

impl HttpClient {
    /// Build an unstarted client for `source`.
    ///
    /// # Errors
    /// Returns `InvalidArg` if the base URL or a default header is malformed.
    pub fn new(source: DataSource, config: ClientConfig) -> Result<Self, CambioError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| CambioError::InvalidArg(format!("base url {:?}: {e}", config.base_url)))?;
        let default_headers = header_map(&config.headers)?;
        Ok(Self {
            source,
            limiter: RateLimiter::new(config.rate_limit),
            config,
            base,
            default_headers,
            session: RwLock::new(None),
            auth: None,
            request_count: AtomicU64::new(0),
        })
    }

    /// Attach an authentication scheme.
    #[must_use]
    pub fn with_auth(mut self, auth: impl AuthScheme + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Provider tag.
    #[must_use]
    pub const fn source(&self) -> DataSource {
        self.source
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Rate limiter consulted before each attempt.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Whether a session is currently held.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    /// Open the session. No-op when already started.
    ///
    /// # Errors
    /// Returns `Connector` if the HTTP client cannot be constructed.
    pub fn start(&self) -> Result<(), CambioError> {
        self.session().map(|_| ())
    }

    /// Drop the session; the next request opens a fresh one.
    pub fn stop(&self) {
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.take().is_some() {
            debug!(source = %self.source, "http session closed");
        }
    }

    fn session(&self) -> Result<reqwest::Client, CambioError> {
        if let Some(client) = self
            .session
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
        {
            return Ok(client.clone());
        }
        let mut guard = self
            .session
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CambioError::connector(self.source.as_str(), e.to_string()))?;
        *guard = Some(client.clone());
        debug!(source = %self.source, "http session opened");
        Ok(client)
    }

    fn headers(&self, extra: Option<&HeaderMap>) -> Result<HeaderMap, CambioError> {
        let mut headers = self.default_headers.clone();
        if let Some(auth) = &self.auth {
            merge_into(&mut headers, &auth.auth_headers(self.config.api_key.as_deref())?);
        }
        if let Some(extra) = extra {
            merge_into(&mut headers, extra);
        }
        Ok(headers)
    }

    fn url(&self, endpoint: &str) -> Result<Url, CambioError> {
        self.base
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| CambioError::InvalidArg(format!("endpoint {endpoint:?}: {e}")))
    }

    /// Convenience for a `GET` without extra headers.
    ///
    /// # Errors
    /// See [`HttpClient::request`].
    pub async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<ResponseEnvelope, CambioError> {
        self.execute(Method::GET, endpoint, params, None, None).await
    }

    /// Perform one logical request with rate limiting and retries.
    ///
    /// Statuses other than 401/403/429/5xx are returned as an envelope so the
    /// caller can interpret them.
    ///
    /// # Errors
    /// `Authentication` on 401/403, `RetriesExhausted` once every attempt failed
    /// transiently, `InvalidArg` for a malformed endpoint or header.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        extra_headers: Option<&HeaderMap>,
    ) -> Result<ResponseEnvelope, CambioError> {
        self.execute(method, endpoint, params, extra_headers, None)
            .await
    }

    /// Like [`HttpClient::request`], abandoning the call once `deadline` has elapsed.
    ///
    /// Each attempt is capped at the remaining time, and neither a rate-limit
    /// wait nor a backoff sleep is started that would cross the deadline.
    ///
    /// # Errors
    /// Additionally returns `DeadlineExceeded` when the deadline stops the retry loop.
    pub async fn request_with_deadline(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        extra_headers: Option<&HeaderMap>,
        deadline: Duration,
    ) -> Result<ResponseEnvelope, CambioError> {
        let deadline = Instant::now().checked_add(deadline);
        self.execute(method, endpoint, params, extra_headers, deadline)
            .await
    }

    /// `GET endpoint` and report whether it answered 2xx.
    pub async fn is_reachable(&self, endpoint: &str) -> bool {
        match self.get(endpoint, &[]).await {
            Ok(env) => env.is_success(),
            Err(e) => {
                debug!(source = %self.source, error = %e, "health check failed");
                false
            }
        }
    }

    /// Observability snapshot.
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            source: self.source,
            request_count: self.request_count.load(Ordering::Relaxed),
            base_endpoint: self.base.to_string(),
            has_auth: self.config.api_key.is_some(),
            rate_limit: self.config.rate_limit,
        }
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        extra_headers: Option<&HeaderMap>,
        deadline: Option<Instant>,
    ) -> Result<ResponseEnvelope, CambioError> {
        let client = self.session()?;
        let url = self.url(endpoint)?;
        let headers = self.headers(extra_headers)?;
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last: Option<CambioError> = None;

        for attempt in 0..attempts {
            match deadline {
                Some(deadline) => {
                    if self.limiter.wait_until(deadline).await.is_none() {
                        return Err(self.deadline_exceeded(attempt));
                    }
                }
                None => {
                    self.limiter.wait_if_needed().await;
                }
            }

            let mut budget = self.config.timeout;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(self.deadline_exceeded(attempt));
                }
                budget = budget.min(remaining);
            }

            let req = client
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .query(params);
            match self.attempt(req, budget).await {
                Ok(env) => return Ok(env),
                Err(e) if e.is_retryable() => {
                    warn!(
                        source = %self.source,
                        endpoint,
                        attempt = attempt + 1,
                        of = attempts,
                        error = %e,
                        "request attempt failed"
                    );
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }

            if attempt + 1 < attempts {
                let delay = self.config.backoff_delay(attempt);
                if let Some(deadline) = deadline
                    && Instant::now()
                        .checked_add(delay)
                        .is_none_or(|wake| wake >= deadline)
                {
                    return Err(self.deadline_exceeded(attempt + 1));
                }
                tokio::time::sleep(delay).await;
            }
        }

        let last = last.map(|e| e.to_string()).unwrap_or_default();
        warn!(source = %self.source, endpoint, attempts, last = %last, "retries exhausted");
        Err(CambioError::RetriesExhausted {
            connector: self.source.as_str().to_string(),
            attempts,
            last,
        })
    }

    fn deadline_exceeded(&self, attempts: u32) -> CambioError {
        CambioError::DeadlineExceeded {
            connector: self.source.as_str().to_string(),
            attempts,
        }
    }

    async fn attempt(
        &self,
        req: reqwest::RequestBuilder,
        budget: Duration,
    ) -> Result<ResponseEnvelope, CambioError> {
        let name = self.source.as_str();
        let started = Instant::now();
        let exchange = async {
            let resp = req.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        };
        let (status, headers, body) = match tokio::time::timeout(budget, exchange).await {
            Err(_) => {
                return Err(CambioError::transient(
                    name,
                    format!("timed out after {budget:?}"),
                ));
            }
            Ok(Err(e)) => return Err(CambioError::transient(name, e.to_string())),
            Ok(Ok(parts)) => parts,
        };
        self.request_count.fetch_add(1, Ordering::Relaxed);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CambioError::Authentication {
                connector: name.to_string(),
                status: status.as_u16(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(CambioError::transient(name, format!("HTTP {status}")));
        }

        let payload = serde_json::from_slice(&body).map_or_else(
            |_| Payload::Text(String::from_utf8_lossy(&body).into_owned()),
            Payload::Json,
        );
        Ok(ResponseEnvelope {
            payload,
            status: status.as_u16(),
            headers: headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
                .collect(),
            elapsed: started.elapsed(),
            source: self.source,
            received_at: Utc::now(),
        })
    }
}
