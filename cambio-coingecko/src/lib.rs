//! cambio-coingecko
//!
//! `PriceConnector` for the public CoinGecko v3 REST API. Serves current prices,
//! batched prices, and price history over the shared [`HttpClient`] transport,
//! so every call is rate limited and retried the same way as other providers.
#![warn(missing_docs)]
// Bindings that only feed log fields go unused without the `tracing` feature.
#![cfg_attr(not(feature = "tracing"), allow(unused_variables))]
mod log;
mod wire;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cambio_core::{
    ApiKeyHeader, BatchPriceProvider, CambioError, ClientConfig, ClientStats, DataSource,
    DateTime, HeaderName, HistoricalPoint, HistoryProvider, HttpClient, PriceConnector,
    PriceProvider, Quote, RateLimitPolicy, ResponseEnvelope, Utc,
};
use moka::future::Cache;
use serde_json::Value;

use wire::CoinListEntry;

use crate::log::{debug, warn};

/// Public API root.
pub const BASE_URL: &str = "https://api.coingecko.com/api/v3";
/// Header carrying a demo-plan API key.
pub const AUTH_HEADER: &str = "x-cg-demo-api-key";

const COIN_LIST_TTL: Duration = Duration::from_secs(24 * 3600);
const HEALTHY_GREETING: &str = "(V3) To the Moon!";
const FALLBACK_CURRENCIES: &[&str] = &[
    "usd", "eur", "btc", "eth", "bnb", "xrp", "ada", "sol", "dot", "matic",
];

const SECS_PER_DAY: i64 = 86_400;
/// Longest `market_chart?days=` window used for history.
const CHART_WINDOW_MAX_DAYS: i64 = 90;

/// Length of the `market_chart` window, which always ends now, that covers
/// `[start, end]`. `None` when `end` lies more than a day in the past or the
/// window would exceed [`CHART_WINDOW_MAX_DAYS`]; those ranges go to
/// `market_chart/range`.
fn chart_window_days(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    if (now - end).num_seconds() > SECS_PER_DAY {
        return None;
    }
    let span = (now - start).num_seconds().max(0);
    let days = ((span + SECS_PER_DAY - 1) / SECS_PER_DAY).max(1);
    (days <= CHART_WINDOW_MAX_DAYS).then_some(days)
}

type CoinIndex = Arc<HashMap<String, String>>;

/// CoinGecko connector.
///
/// Symbols are resolved to CoinGecko coin ids through `coins/list`, which is
/// fetched at most once per day. Ids pinned with
/// [`CoinGeckoConnector::with_coin_id`] bypass the lookup.
pub struct CoinGeckoConnector {
    http: HttpClient,
    coin_list: Cache<(), CoinIndex>,
    pinned: HashMap<String, String>,
}

impl std::fmt::Debug for CoinGeckoConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoConnector")
            .field("http", &self.http)
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}

impl CoinGeckoConnector {
    /// Connector against the public API using the default configuration.
    ///
    /// # Errors
    /// Returns `InvalidArg` if the configuration cannot build a transport.
    pub fn new(api_key: Option<String>) -> Result<Self, CambioError> {
        Self::with_config(Self::default_config(api_key))
    }

    /// Default transport configuration. Keyed access gets the higher demo-plan limits.
    #[must_use]
    pub fn default_config(api_key: Option<String>) -> ClientConfig {
        let (minute, hour, day) = if api_key.is_some() {
            (50, 1000, 10_000)
        } else {
            (10, 100, 1000)
        };
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "application/json".to_string());
        headers.insert(
            "user-agent".to_string(),
            concat!("cambio/", env!("CARGO_PKG_VERSION")).to_string(),
        );
        ClientConfig {
            api_key,
            rate_limit: RateLimitPolicy {
                requests_per_minute: minute,
                requests_per_hour: hour,
                requests_per_day: day,
                ..RateLimitPolicy::default()
            },
            headers,
            ..ClientConfig::new(BASE_URL)
        }
    }

    /// Connector over an explicit transport configuration.
    ///
    /// # Errors
    /// Returns `InvalidArg` for a malformed base URL or default header.
    pub fn with_config(config: ClientConfig) -> Result<Self, CambioError> {
        let http = HttpClient::new(DataSource::CoinGecko, config)?
            .with_auth(ApiKeyHeader::new(HeaderName::from_static(AUTH_HEADER)));
        Ok(Self {
            http,
            coin_list: Cache::builder()
                .time_to_live(COIN_LIST_TTL)
                .max_capacity(1)
                .build(),
            pinned: HashMap::new(),
        })
    }

    /// Pin `symbol` to a CoinGecko coin id, skipping the `coins/list` lookup.
    #[must_use]
    pub fn with_coin_id(mut self, symbol: &str, coin_id: impl Into<String>) -> Self {
        self.pinned
            .insert(symbol.trim().to_lowercase(), coin_id.into());
        self
    }

    /// Underlying transport.
    #[must_use]
    pub const fn http(&self) -> &HttpClient {
        &self.http
    }

    fn require_success(
        &self,
        env: ResponseEnvelope,
        what: &str,
    ) -> Result<ResponseEnvelope, CambioError> {
        if env.is_success() {
            Ok(env)
        } else {
            Err(CambioError::connector(
                self.name(),
                format!("{what} returned status {}", env.status),
            ))
        }
    }

    async fn coin_index(&self) -> Result<CoinIndex, CambioError> {
        self.coin_list
            .try_get_with((), async {
                let env = self.http.get("coins/list", &[]).await?;
                let entries: Vec<CoinListEntry> =
                    self.require_success(env, "coins/list")?.decode()?;
                let index = wire::index_coin_list(entries);
                debug!(coins = index.len(), "coingecko coin list loaded");
                Ok::<_, CambioError>(Arc::new(index))
            })
            .await
            .map_err(|e: Arc<CambioError>| (*e).clone())
    }

    /// CoinGecko id for `symbol`, or `None` when CoinGecko does not list it.
    ///
    /// # Errors
    /// Propagates transport and decoding failures of the coin list.
    pub async fn coin_id(&self, symbol: &str) -> Result<Option<String>, CambioError> {
        let key = symbol.trim().to_lowercase();
        if let Some(id) = self.pinned.get(&key) {
            return Ok(Some(id.clone()));
        }
        Ok(self.coin_index().await?.get(&key).cloned())
    }

    async fn simple_price(&self, ids: &[&str], currency: &str) -> Result<Value, CambioError> {
        let yes = || "true".to_string();
        let params = [
            ("ids", ids.join(",")),
            ("vs_currencies", currency.to_string()),
            ("include_market_cap", yes()),
            ("include_24hr_vol", yes()),
            ("include_24hr_change", yes()),
            ("include_last_updated_at", yes()),
        ];
        let env = self.http.get("simple/price", &params).await?;
        self.require_success(env, "simple/price")?
            .decode::<Value>()
    }
}

#[async_trait]
impl PriceConnector for CoinGeckoConnector {
    fn source(&self) -> DataSource {
        DataSource::CoinGecko
    }

    async fn start(&self) -> Result<(), CambioError> {
        self.http.start()
    }

    async fn stop(&self) -> Result<(), CambioError> {
        self.http.stop();
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.http.get("ping", &[]).await {
            Ok(env) if env.is_success() => env
                .json()
                .and_then(|v| v.get("gecko_says"))
                .and_then(Value::as_str)
                == Some(HEALTHY_GREETING),
            Ok(env) => {
                debug!(status = env.status, "coingecko ping rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "coingecko ping failed");
                false
            }
        }
    }

    fn stats(&self) -> ClientStats {
        self.http.stats()
    }

    async fn supported_currencies(&self) -> Result<Vec<String>, CambioError> {
        let listed = match self.http.get("simple/supported_vs_currencies", &[]).await {
            Ok(env) => self
                .require_success(env, "simple/supported_vs_currencies")
                .and_then(|env| env.decode::<Vec<String>>()),
            Err(e) => Err(e),
        };
        Ok(listed.unwrap_or_else(|e| {
            warn!(error = %e, "coingecko currency list unavailable, using fallback");
            FALLBACK_CURRENCIES.iter().map(|c| (*c).to_string()).collect()
        }))
    }

    fn as_price_provider(&self) -> Option<&dyn PriceProvider> {
        Some(self as &dyn PriceProvider)
    }

    fn as_batch_price_provider(&self) -> Option<&dyn BatchPriceProvider> {
        Some(self as &dyn BatchPriceProvider)
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        Some(self as &dyn HistoryProvider)
    }
}

#[async_trait]
impl PriceProvider for CoinGeckoConnector {
    async fn current_price(
        &self,
        symbol: &str,
        currency: &str,
    ) -> Result<Option<Quote>, CambioError> {
        let Some(id) = self.coin_id(symbol).await? else {
            warn!(symbol, "coingecko does not list symbol");
            return Ok(None);
        };
        let currency = currency.trim().to_lowercase();
        let body = self.simple_price(&[id.as_str()], &currency).await?;
        Ok(body
            .get(&id)
            .and_then(|data| wire::quote_from_simple_price(symbol, &id, &currency, data)))
    }
}

#[async_trait]
impl BatchPriceProvider for CoinGeckoConnector {
    async fn multiple_prices(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<Vec<Quote>, CambioError> {
        let mut resolved: Vec<(&str, String)> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.coin_id(symbol).await? {
                Some(id) => resolved.push((symbol.as_str(), id)),
                None => warn!(symbol = %symbol, "coingecko does not list symbol"),
            }
        }
        if resolved.is_empty() {
            return Ok(Vec::new());
        }
        let currency = currency.trim().to_lowercase();
        let mut ids: Vec<&str> = resolved.iter().map(|(_, id)| id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let body = self.simple_price(&ids, &currency).await?;
        Ok(resolved
            .iter()
            .filter_map(|(symbol, id)| {
                body.get(id)
                    .and_then(|data| wire::quote_from_simple_price(symbol, id, &currency, data))
            })
            .collect())
    }
}

#[async_trait]
impl HistoryProvider for CoinGeckoConnector {
    async fn historical_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        if start > end {
            return Err(CambioError::InvalidArg(format!(
                "history range starts after it ends: {start} > {end}"
            )));
        }
        let Some(id) = self.coin_id(symbol).await? else {
            warn!(symbol, "coingecko does not list symbol");
            return Ok(Vec::new());
        };
        let currency = currency.trim().to_lowercase();
        let (endpoint, params) = match chart_window_days(start, end, Utc::now()) {
            Some(days) => (
                format!("coins/{id}/market_chart"),
                vec![("vs_currency", currency.clone()), ("days", days.to_string())],
            ),
            None => (
                format!("coins/{id}/market_chart/range"),
                vec![
                    ("vs_currency", currency.clone()),
                    ("from", start.timestamp().to_string()),
                    ("to", end.timestamp().to_string()),
                ],
            ),
        };
        let env = self.http.get(&endpoint, &params).await?;
        let body = self.require_success(env, &endpoint)?.decode::<Value>()?;
        wire::chart_points(symbol, &currency, &body, start, end)
    }
}
