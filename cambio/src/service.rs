use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cambio_cache::{Cache, CacheStats, Ttl};
use cambio_core::{
    CacheConfig, CambioError, ClientStats, DataSource, DateTime, HistoricalPoint, MemoryStore,
    PriceStore, Quote, ServiceConfig, Utc,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys;
use crate::log::{debug, info, warn};
use crate::registry::ClientRegistry;

const HEALTH_CHECK_KEY: &str = "health_check";

/// Per-call cache behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Read from and write to the cache.
    pub use_cache: bool,
    /// TTL for values written by this call; `None` uses the service default for the data kind.
    pub ttl: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            use_cache: true,
            ttl: None,
        }
    }
}

impl CachePolicy {
    /// Skip the cache entirely.
    #[must_use]
    pub const fn bypass() -> Self {
        Self {
            use_cache: false,
            ttl: None,
        }
    }

    /// Use the cache with an explicit TTL.
    #[must_use]
    pub const fn with_ttl(ttl: Duration) -> Self {
        Self {
            use_cache: true,
            ttl: Some(ttl),
        }
    }
}

/// Per-component health; a failed check marks only its own component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// The store answered a read.
    pub store: bool,
    /// A sentinel value round-tripped through the cache.
    pub cache: bool,
    /// Health of every registered provider.
    pub providers: BTreeMap<DataSource, bool>,
}

impl HealthReport {
    /// Whether every component is healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.store && self.cache && self.providers.values().all(|h| *h)
    }
}

/// Caller-facing market data API: cache first, then providers, then the store.
///
/// Fresh provider data is written through to the cache and the store. Store
/// failures are logged and never fail a call that already has a value.
pub struct DataService {
    registry: ClientRegistry,
    cache: Arc<Cache<Value>>,
    store: Arc<dyn PriceStore>,
    config: ServiceConfig,
}

impl std::fmt::Debug for DataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataService")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DataService`].
#[derive(Default)]
pub struct DataServiceBuilder {
    registry: Option<ClientRegistry>,
    cache: Option<Arc<Cache<Value>>>,
    cache_config: CacheConfig,
    store: Option<Arc<dyn PriceStore>>,
    config: ServiceConfig,
}

impl DataServiceBuilder {
    /// Providers to fetch from. Required.
    #[must_use]
    pub fn registry(mut self, registry: ClientRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share an existing cache instead of creating one.
    #[must_use]
    pub fn cache(mut self, cache: Arc<Cache<Value>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Configuration for the cache created at build time.
    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Persistence backend. Defaults to an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn PriceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Service-level TTLs, freshness window, and history source.
    #[must_use]
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the service.
    ///
    /// # Errors
    /// Returns `InvalidArg` when no registry was supplied.
    pub fn build(self) -> Result<DataService, CambioError> {
        let registry = self.registry.ok_or_else(|| {
            CambioError::InvalidArg("data service needs a client registry".into())
        })?;
        Ok(DataService {
            registry,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(Cache::new(self.cache_config))),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            config: self.config,
        })
    }
}

fn require(what: &str, value: &str) -> Result<(), CambioError> {
    if value.trim().is_empty() {
        Err(CambioError::InvalidArg(format!("{what} must not be blank")))
    } else {
        Ok(())
    }
}

impl DataService {
    /// Start building a service.
    #[must_use]
    pub fn builder() -> DataServiceBuilder {
        DataServiceBuilder::default()
    }

    /// Provider registry.
    #[must_use]
    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Cache shared by every operation.
    #[must_use]
    pub fn cache(&self) -> &Arc<Cache<Value>> {
        &self.cache
    }

    /// Start the cache sweeper and every client.
    ///
    /// # Errors
    /// `Lifecycle` when some clients failed to start; the others are running.
    pub async fn start(&self) -> Result<(), CambioError> {
        self.cache.start();
        self.registry.start_all().await?;
        info!(sources = ?self.registry.sources(), "data service started");
        Ok(())
    }

    /// Stop the sweeper, every client, and the store, even when some steps fail.
    ///
    /// # Errors
    /// `Lifecycle` with every failure encountered.
    pub async fn shutdown(&self) -> Result<(), CambioError> {
        self.cache.stop().await;
        let mut errors = Vec::new();
        if let Err(e) = self.registry.stop_all().await {
            errors.extend(e.flatten());
        }
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "store failed to close");
            errors.push(e);
        }
        if errors.is_empty() {
            info!("data service stopped");
            Ok(())
        } else {
            Err(CambioError::Lifecycle(errors))
        }
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.cache.get(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "dropping undecodable cache entry");
                self.cache.delete(key).await;
                None
            }
        }
    }

    async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.cache.set(key, v, Ttl::from(ttl)).await;
            }
            Err(e) => warn!(key, error = %e, "value not cacheable"),
        }
    }

    async fn persist_quote(&self, quote: &Quote) {
        if let Err(e) = self.store.save_current_price(quote).await {
            warn!(symbol = quote.symbol(), error = %e, "failed to persist quote");
        }
    }

    /// Current price of `symbol` in `currency`.
    ///
    /// Returns `None` when no provider has the symbol and the store has nothing
    /// younger than the freshness window.
    ///
    /// # Errors
    /// `InvalidArg` for a blank symbol or currency. Nothing else fails the call.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "cambio::service::current_price", skip(self)))]
    pub async fn current_price(
        &self,
        symbol: &str,
        currency: &str,
        policy: CachePolicy,
    ) -> Result<Option<Quote>, CambioError> {
        require("symbol", symbol)?;
        require("currency", currency)?;
        let key = keys::price_key(symbol, currency);

        if policy.use_cache
            && let Some(q) = self.cached::<Quote>(&key).await
        {
            debug!(key = %key, "price cache hit");
            return Ok(Some(q));
        }

        match self.registry.try_current_price(symbol, currency).await {
            Ok(q) => {
                if policy.use_cache {
                    self.put(&key, &q, policy.ttl.unwrap_or(self.config.price_ttl))
                        .await;
                }
                self.persist_quote(&q).await;
                Ok(Some(q))
            }
            Err(e) => {
                warn!(symbol, currency, error = %e, "providers could not price symbol");
                Ok(self.stored_quote(symbol, currency).await)
            }
        }
    }

    async fn stored_quote(&self, symbol: &str, currency: &str) -> Option<Quote> {
        match self.store.get_current_price(symbol, currency, None).await {
            Ok(Some(q)) => {
                let age = q.age_at(Utc::now());
                if age < self.config.store_freshness {
                    info!(symbol, age_secs = age.as_secs(), "serving stored price");
                    Some(q)
                } else {
                    debug!(symbol, age_secs = age.as_secs(), "stored price too old");
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(symbol, error = %e, "store fallback failed");
                None
            }
        }
    }

    /// Current prices for `symbols`; symbols that cannot be priced are absent.
    ///
    /// Cached symbols are served from the cache; the rest go to the providers in
    /// one batched pass. Result order is not guaranteed.
    ///
    /// # Errors
    /// `InvalidArg` for a blank currency or symbol.
    #[cfg_attr(feature = "tracing", tracing::instrument(
        name = "cambio::service::multiple_prices",
        skip(self, symbols),
        fields(requested = symbols.len()),
    ))]
    pub async fn multiple_prices(
        &self,
        symbols: &[String],
        currency: &str,
        policy: CachePolicy,
    ) -> Result<Vec<Quote>, CambioError> {
        require("currency", currency)?;
        for s in symbols {
            require("symbol", s)?;
        }

        let mut prices = Vec::with_capacity(symbols.len());
        let mut uncached: Vec<String> = Vec::new();
        for s in symbols {
            let s = s.trim().to_uppercase();
            if uncached.contains(&s) || prices.iter().any(|q: &Quote| q.symbol() == s) {
                continue;
            }
            if policy.use_cache
                && let Some(q) = self.cached::<Quote>(&keys::price_key(&s, currency)).await
            {
                prices.push(q);
            } else {
                uncached.push(s);
            }
        }
        debug!(hits = prices.len(), misses = uncached.len(), "price cache partition");

        if !uncached.is_empty() {
            let ttl = policy.ttl.unwrap_or(self.config.price_ttl);
            for q in self.registry.multiple_prices(&uncached, currency).await {
                if policy.use_cache {
                    self.put(&keys::price_key(q.symbol(), currency), &q, ttl)
                        .await;
                }
                self.persist_quote(&q).await;
                prices.push(q);
            }
        }
        Ok(prices)
    }

    /// Price history of `symbol` over `[start, end]`.
    ///
    /// The store is used without touching the network when its data spans the
    /// whole range. Only the boundary timestamps are checked; gaps inside the
    /// range are not detected.
    ///
    /// # Errors
    /// `InvalidArg` for a blank symbol or currency, or `start > end`.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "cambio::service::historical_prices", skip(self)))]
    pub async fn historical_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
        policy: CachePolicy,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        require("symbol", symbol)?;
        require("currency", currency)?;
        if start > end {
            return Err(CambioError::InvalidArg(format!(
                "history range starts after it ends: {start} > {end}"
            )));
        }
        let key = keys::history_key(symbol, start, end, currency);
        let ttl = policy.ttl.unwrap_or(self.config.history_ttl);

        if policy.use_cache
            && let Some(points) = self.cached::<Vec<HistoricalPoint>>(&key).await
            && !points.is_empty()
        {
            debug!(key = %key, "history cache hit");
            return Ok(points);
        }

        match self
            .store
            .get_historical_prices(symbol, start, end, currency)
            .await
        {
            Ok(stored) => {
                let earliest = stored.iter().map(HistoricalPoint::timestamp).min();
                let latest = stored.iter().map(HistoricalPoint::timestamp).max();
                if let (Some(earliest), Some(latest)) = (earliest, latest)
                    && earliest <= start
                    && latest >= end
                {
                    debug!(points = stored.len(), "store covers history range");
                    if policy.use_cache {
                        self.put(&key, &stored, ttl).await;
                    }
                    return Ok(stored);
                }
            }
            Err(e) => warn!(error = %e, "store history lookup failed"),
        }

        let source = if self.registry.get(self.config.history_source).is_some() {
            self.config.history_source
        } else {
            self.registry.primary().source()
        };
        let points = match self
            .registry
            .historical_prices_from(source, symbol, start, end, currency)
            .await
        {
            Ok(points) => points,
            Err(e) => {
                warn!(source = %source, error = %e, "history fetch failed");
                return Ok(Vec::new());
            }
        };
        if points.is_empty() {
            warn!(source = %source, "provider returned no history");
            return Ok(points);
        }

        match self.store.save_historical_prices(&points).await {
            Ok(saved) => info!(saved, "persisted history"),
            Err(e) => warn!(error = %e, "failed to persist history"),
        }
        if policy.use_cache {
            self.put(&key, &points, ttl).await;
        }
        Ok(points)
    }

    /// Drop cached prices for `symbols`, refetch them from the providers, and
    /// report which ones succeeded. Keys are upper-cased symbols.
    ///
    /// # Errors
    /// `InvalidArg` for a blank currency or symbol.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "cambio::service::refresh_price_data", skip(self, symbols)))]
    pub async fn refresh_price_data(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<BTreeMap<String, bool>, CambioError> {
        if symbols.is_empty() {
            return Ok(BTreeMap::new());
        }
        require("currency", currency)?;
        for s in symbols {
            require("symbol", s)?;
        }
        for s in symbols {
            self.cache.delete(&keys::price_key(s, currency)).await;
        }
        let fetched = self
            .multiple_prices(symbols, currency, CachePolicy::bypass())
            .await?;
        let report: BTreeMap<String, bool> = symbols
            .iter()
            .map(|s| {
                let s = s.trim().to_uppercase();
                let ok = fetched.iter().any(|q| q.symbol() == s);
                (s, ok)
            })
            .collect();
        info!(
            refreshed = report.values().filter(|ok| **ok).count(),
            requested = report.len(),
            "price refresh complete"
        );
        Ok(report)
    }

    /// Cache counters and occupancy.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Remove cached entries matching `pattern`, or everything when `None`.
    ///
    /// # Errors
    /// `InvalidArg` for a malformed pattern.
    pub async fn clear_cache(&self, pattern: Option<&str>) -> Result<usize, CambioError> {
        match pattern {
            Some(p) => self.cache.invalidate_pattern(p).await,
            None => Ok(self.cache.clear().await),
        }
    }

    /// Delete stored history older than `days_to_keep` days.
    ///
    /// # Errors
    /// Propagates the store's error.
    pub async fn cleanup_old_data(&self, days_to_keep: u32) -> Result<u64, CambioError> {
        let removed = self.store.cleanup_old_data(days_to_keep).await?;
        info!(removed, days_to_keep, "old data cleaned up");
        Ok(removed)
    }

    /// Check the store, the cache, and every provider independently.
    pub async fn health_check(&self) -> HealthReport {
        let store = match self.store.get_current_price("BTC", "usd", None).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "store health check failed");
                false
            }
        };

        let cache = self
            .cache
            .set(
                HEALTH_CHECK_KEY,
                Value::String("ok".into()),
                Ttl::After(Duration::from_secs(1)),
            )
            .await
            && self.cache.exists(HEALTH_CHECK_KEY).await;
        self.cache.delete(HEALTH_CHECK_KEY).await;

        HealthReport {
            store,
            cache,
            providers: self.registry.health().await,
        }
    }

    /// Observability snapshot of every registered client.
    #[must_use]
    pub fn client_stats(&self) -> Vec<ClientStats> {
        self.registry.stats()
    }
}
