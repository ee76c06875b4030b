use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cambio_core::{
    CambioError, Capability, ClientStats, DataSource, DateTime, HistoricalPoint, PriceConnector,
    Quote, Utc,
};
use futures::future::join_all;

use crate::log::{debug, info, warn};

/// Ordered set of price connectors: one primary, then fallbacks in registration order.
///
/// Failover is strictly sequential; a source is only asked after every source
/// before it failed, timed out, or had no data.
pub struct ClientRegistry {
    clients: Vec<Arc<dyn PriceConnector>>,
    provider_timeout: Option<Duration>,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("sources", &self.sources())
            .field("provider_timeout", &self.provider_timeout)
            .finish()
    }
}

/// Builder for [`ClientRegistry`].
#[derive(Default)]
pub struct ClientRegistryBuilder {
    entries: Vec<(Arc<dyn PriceConnector>, bool)>,
    provider_timeout: Option<Duration>,
}

impl ClientRegistryBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector. At most one registration may be primary; when none
    /// is, the first registered connector acts as primary.
    #[must_use]
    pub fn register(mut self, client: Arc<dyn PriceConnector>, is_primary: bool) -> Self {
        self.entries.push((client, is_primary));
        self
    }

    /// Register the primary connector.
    #[must_use]
    pub fn primary(self, client: Arc<dyn PriceConnector>) -> Self {
        self.register(client, true)
    }

    /// Register a fallback connector.
    #[must_use]
    pub fn fallback(self, client: Arc<dyn PriceConnector>) -> Self {
        self.register(client, false)
    }

    /// Bound every individual provider call; an overrun surfaces as `ProviderTimeout`.
    #[must_use]
    pub const fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = Some(timeout);
        self
    }

    /// Validate the wiring and build the registry.
    ///
    /// # Errors
    /// Returns `InvalidArg` when nothing is registered, more than one connector is
    /// marked primary, or two connectors share a `DataSource`.
    pub fn build(self) -> Result<ClientRegistry, CambioError> {
        if self.entries.is_empty() {
            return Err(CambioError::InvalidArg(
                "no clients registered; add at least one via register(...)".into(),
            ));
        }
        let primaries: Vec<DataSource> = self
            .entries
            .iter()
            .filter(|(_, p)| *p)
            .map(|(c, _)| c.source())
            .collect();
        if primaries.len() > 1 {
            return Err(CambioError::InvalidArg(format!(
                "more than one primary client: {primaries:?}"
            )));
        }
        let mut seen = HashSet::new();
        for (c, _) in &self.entries {
            if !seen.insert(c.source()) {
                return Err(CambioError::InvalidArg(format!(
                    "client for {} registered twice",
                    c.source()
                )));
            }
        }

        let mut clients = Vec::with_capacity(self.entries.len());
        let mut fallbacks = Vec::new();
        for (c, is_primary) in self.entries {
            if is_primary {
                clients.push(c);
            } else {
                fallbacks.push(c);
            }
        }
        clients.extend(fallbacks);
        Ok(ClientRegistry {
            clients,
            provider_timeout: self.provider_timeout,
        })
    }
}

/// Tag an error with the connector it came from unless it already names one.
pub(crate) fn tag_err(connector: &str, e: CambioError) -> CambioError {
    match e {
        e @ (CambioError::NotFound { .. }
        | CambioError::ProviderTimeout { .. }
        | CambioError::Connector { .. }
        | CambioError::Transient { .. }
        | CambioError::Authentication { .. }
        | CambioError::RetriesExhausted { .. }
        | CambioError::DeadlineExceeded { .. }
        | CambioError::AllProvidersTimedOut { .. }
        | CambioError::AllProvidersFailed(_)) => e,
        other => CambioError::connector(connector, other.to_string()),
    }
}

/// Collapse a set of provider errors into one outcome.
///
/// Rules:
/// - If `attempted_any` is false → `Unsupported(capability)`.
/// - If all errors are `ProviderTimeout` → `AllProvidersTimedOut(capability)`.
/// - If `not_found_what` is `Some` and all errors are `NotFound` → `NotFound(what)`.
/// - Else → `AllProvidersFailed(errors)`.
pub fn collapse_errors(
    capability: Capability,
    attempted_any: bool,
    errors: Vec<CambioError>,
    not_found_what: Option<String>,
) -> CambioError {
    if !attempted_any {
        return CambioError::unsupported(capability.to_string());
    }
    if !errors.is_empty()
        && errors
            .iter()
            .all(|e| matches!(e, CambioError::ProviderTimeout { .. }))
    {
        return CambioError::AllProvidersTimedOut {
            capability: capability.to_string(),
        };
    }
    if let Some(what) = not_found_what
        && !errors.is_empty()
        && errors
            .iter()
            .all(|e| matches!(e, CambioError::NotFound { .. }))
    {
        return CambioError::not_found(what);
    }
    CambioError::AllProvidersFailed(errors)
}

impl ClientRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> ClientRegistryBuilder {
        ClientRegistryBuilder::new()
    }

    /// Wrap a provider future with the configured timeout.
    async fn call<T, Fut>(
        &self,
        connector: &str,
        capability: Capability,
        fut: Fut,
    ) -> Result<T, CambioError>
    where
        Fut: Future<Output = Result<T, CambioError>>,
    {
        match self.provider_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
                Err(CambioError::provider_timeout(connector, capability.as_str()))
            }),
            None => fut.await,
        }
    }

    /// The primary connector.
    #[must_use]
    pub fn primary(&self) -> &Arc<dyn PriceConnector> {
        &self.clients[0]
    }

    /// Connector registered for `source`.
    #[must_use]
    pub fn get(&self, source: DataSource) -> Option<&Arc<dyn PriceConnector>> {
        self.clients.iter().find(|c| c.source() == source)
    }

    /// Registered sources, primary first.
    #[must_use]
    pub fn sources(&self) -> Vec<DataSource> {
        self.clients.iter().map(|c| c.source()).collect()
    }

    /// Current price from the first source that has one.
    ///
    /// # Errors
    /// `Unsupported` when no source prices single symbols, `NotFound` when every
    /// source answered without data, `AllProvidersTimedOut` when every source timed
    /// out, and `AllProvidersFailed` otherwise.
    #[cfg_attr(feature = "tracing", tracing::instrument(
        name = "cambio::registry::current_price",
        skip(self),
        fields(sources = self.clients.len()),
    ))]
    pub async fn try_current_price(
        &self,
        symbol: &str,
        currency: &str,
    ) -> Result<Quote, CambioError> {
        let mut attempted_any = false;
        let mut errors = Vec::new();

        for c in &self.clients {
            let Some(provider) = c.as_price_provider() else {
                continue;
            };
            attempted_any = true;
            let name = c.name();
            match self
                .call(
                    name,
                    Capability::CurrentPrice,
                    provider.current_price(symbol, currency),
                )
                .await
            {
                Ok(Some(q)) => {
                    if !errors.is_empty() {
                        info!(source = name, symbol, "served by fallback source");
                    }
                    return Ok(q);
                }
                Ok(None) => {
                    warn!(source = name, symbol, currency, "source has no price, trying next");
                    errors.push(CambioError::not_found(format!("{name}: {symbol}/{currency}")));
                }
                Err(e) => {
                    warn!(source = name, symbol, error = %e, "source failed, trying next");
                    errors.push(tag_err(name, e));
                }
            }
        }

        Err(collapse_errors(
            Capability::CurrentPrice,
            attempted_any,
            errors,
            Some(format!("price for {symbol}/{currency}")),
        ))
    }

    /// Current price from the first source that has one; `None` when every source
    /// failed or had no data.
    pub async fn current_price(&self, symbol: &str, currency: &str) -> Option<Quote> {
        match self.try_current_price(symbol, currency).await {
            Ok(q) => Some(q),
            Err(e) => {
                warn!(symbol, currency, error = %e, "no source could price symbol");
                None
            }
        }
    }

    /// Prices for `symbols`, resolving whatever each source can before moving on.
    ///
    /// Batch-capable sources receive every unresolved symbol in one call; others
    /// receive concurrent single-symbol calls. Failures only shrink the result.
    #[cfg_attr(feature = "tracing", tracing::instrument(
        name = "cambio::registry::multiple_prices",
        skip(self, symbols),
        fields(requested = symbols.len()),
    ))]
    pub async fn multiple_prices(&self, symbols: &[String], currency: &str) -> Vec<Quote> {
        let mut pending: Vec<String> = Vec::with_capacity(symbols.len());
        for s in symbols {
            let s = s.trim().to_uppercase();
            if !s.is_empty() && !pending.contains(&s) {
                pending.push(s);
            }
        }
        let mut found: Vec<Quote> = Vec::with_capacity(pending.len());

        for c in &self.clients {
            if pending.is_empty() {
                break;
            }
            let name = c.name();
            let fetched: Vec<Quote> = if let Some(batch) = c.as_batch_price_provider() {
                match self
                    .call(
                        name,
                        Capability::MultiplePrices,
                        batch.multiple_prices(&pending, currency),
                    )
                    .await
                {
                    Ok(quotes) => quotes,
                    Err(e) => {
                        warn!(source = name, error = %e, "batch price fetch failed, trying next");
                        continue;
                    }
                }
            } else if let Some(single) = c.as_price_provider() {
                let calls = pending.iter().map(|s| {
                    self.call(
                        name,
                        Capability::CurrentPrice,
                        single.current_price(s, currency),
                    )
                });
                join_all(calls)
                    .await
                    .into_iter()
                    .zip(&pending)
                    .filter_map(|(res, s)| match res {
                        Ok(q) => q,
                        Err(e) => {
                            warn!(source = name, symbol = %s, error = %e, "price fetch failed");
                            None
                        }
                    })
                    .collect()
            } else {
                continue;
            };

            for q in fetched {
                if let Some(pos) = pending.iter().position(|s| s == q.symbol()) {
                    pending.swap_remove(pos);
                    found.push(q);
                }
            }
        }

        if !pending.is_empty() {
            warn!(unresolved = ?pending, "some symbols could not be priced");
        }
        found
    }

    /// History of `symbol` from the connector registered for `source`.
    ///
    /// # Errors
    /// `Unsupported` when `source` is not registered or cannot serve history;
    /// otherwise the connector's error.
    #[cfg_attr(feature = "tracing", tracing::instrument(
        name = "cambio::registry::historical_prices_from",
        skip(self),
    ))]
    pub async fn historical_prices_from(
        &self,
        source: DataSource,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        let c = self
            .get(source)
            .ok_or_else(|| CambioError::unsupported(format!("{source} not registered")))?;
        let provider = c
            .as_history_provider()
            .ok_or_else(|| CambioError::unsupported(Capability::HistoricalPrices.to_string()))?;
        self.call(
            c.name(),
            Capability::HistoricalPrices,
            provider.historical_prices(symbol, start, end, currency),
        )
        .await
        .map_err(|e| tag_err(c.name(), e))
    }

    /// Start every client; one failure does not stop the others from starting.
    ///
    /// # Errors
    /// `Lifecycle` listing every client that failed to start.
    pub async fn start_all(&self) -> Result<(), CambioError> {
        let results = join_all(self.clients.iter().map(|c| c.start())).await;
        self.lifecycle_outcome("start", results)
    }

    /// Stop every client; one failure does not stop the others from stopping.
    ///
    /// # Errors
    /// `Lifecycle` listing every client that failed to stop.
    pub async fn stop_all(&self) -> Result<(), CambioError> {
        let results = join_all(self.clients.iter().map(|c| c.stop())).await;
        self.lifecycle_outcome("stop", results)
    }

    fn lifecycle_outcome(
        &self,
        action: &str,
        results: Vec<Result<(), CambioError>>,
    ) -> Result<(), CambioError> {
        let errors: Vec<CambioError> = self
            .clients
            .iter()
            .zip(results)
            .filter_map(|(c, r)| {
                r.err().map(|e| {
                    warn!(source = c.name(), error = %e, "client failed to {action}");
                    tag_err(c.name(), e)
                })
            })
            .collect();
        if errors.is_empty() {
            debug!(clients = self.clients.len(), "clients {action} complete");
            Ok(())
        } else {
            Err(CambioError::Lifecycle(errors))
        }
    }

    /// Health of every client. A check that overruns the provider timeout is unhealthy.
    pub async fn health(&self) -> BTreeMap<DataSource, bool> {
        let checks = self.clients.iter().map(|c| async move {
            let healthy = match self.provider_timeout {
                Some(t) => tokio::time::timeout(t, c.health_check())
                    .await
                    .unwrap_or(false),
                None => c.health_check().await,
            };
            (c.source(), healthy)
        });
        join_all(checks).await.into_iter().collect()
    }

    /// Observability snapshot of every client, primary first.
    #[must_use]
    pub fn stats(&self) -> Vec<ClientStats> {
        self.clients.iter().map(|c| c.stats()).collect()
    }
}
