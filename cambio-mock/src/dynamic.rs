use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use cambio_core::{
    BatchPriceProvider, CambioError, Capability, ClientStats, DataSource, DateTime,
    HistoricalPoint, HistoryProvider, PriceConnector, PriceProvider, Quote, RateLimitPolicy, Utc,
};

/// Instruction for how a method should behave for a given input.
#[derive(Debug, Clone)]
pub enum MockBehavior<T> {
    /// Return the provided value immediately.
    Return(T),
    /// Fail immediately with the provided error.
    Fail(CambioError),
    /// Hang indefinitely (simulate a timeout).
    Hang,
}

impl<T> MockBehavior<T> {
    async fn resolve(self) -> Result<T, CambioError> {
        match self {
            Self::Return(v) => Ok(v),
            Self::Fail(e) => Err(e),
            Self::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
struct InternalState {
    price_rules: HashMap<String, MockBehavior<Option<Quote>>>,
    history_rules: HashMap<String, MockBehavior<Vec<HistoricalPoint>>>,
    start_rule: Option<MockBehavior<()>>,
    calls: HashMap<Capability, usize>,
    price_requests: Vec<(String, String)>,
    batch_requests: Vec<Vec<String>>,
    starts: usize,
    stops: usize,
}

fn key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Controller handle used by tests to drive the dynamic mock from the outside.
pub struct DynamicMockController {
    state: Arc<Mutex<InternalState>>,
    healthy: Arc<AtomicBool>,
}

impl DynamicMockController {
    /// Set the behavior of price lookups for `symbol` (single and batched).
    ///
    /// Symbols without a rule price as `Ok(None)`.
    pub async fn set_price_behavior(&self, symbol: &str, behavior: MockBehavior<Option<Quote>>) {
        let mut guard = self.state.lock().await;
        guard.price_rules.insert(key(symbol), behavior);
    }

    /// Set the behavior of history lookups for `symbol`.
    ///
    /// Symbols without a rule return an empty series.
    pub async fn set_history_behavior(
        &self,
        symbol: &str,
        behavior: MockBehavior<Vec<HistoricalPoint>>,
    ) {
        let mut guard = self.state.lock().await;
        guard.history_rules.insert(key(symbol), behavior);
    }

    /// Set the behavior of `start`; `None` restores the default success.
    pub async fn set_start_behavior(&self, behavior: Option<MockBehavior<()>>) {
        self.state.lock().await.start_rule = behavior;
    }

    /// Set what `health_check` reports.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Number of calls made for `capability`.
    pub async fn calls(&self, capability: Capability) -> usize {
        let guard = self.state.lock().await;
        guard.calls.get(&capability).copied().unwrap_or(0)
    }

    /// `(symbol, currency)` pairs passed to `current_price`, in call order.
    pub async fn price_requests(&self) -> Vec<(String, String)> {
        self.state.lock().await.price_requests.clone()
    }

    /// Symbol lists passed to `multiple_prices`, in call order.
    pub async fn batch_requests(&self) -> Vec<Vec<String>> {
        self.state.lock().await.batch_requests.clone()
    }

    /// `(starts, stops)` observed so far.
    pub async fn lifecycle_calls(&self) -> (usize, usize) {
        let guard = self.state.lock().await;
        (guard.starts, guard.stops)
    }

    /// Clear all configured behaviors and request logs.
    pub async fn clear_all_behaviors(&self) {
        let mut guard = self.state.lock().await;
        *guard = InternalState::default();
        self.healthy.store(true, Ordering::Relaxed);
    }
}

/// A connector that defers all behavior to an external controller.
pub struct DynamicMockConnector {
    source: DataSource,
    capabilities: HashSet<Capability>,
    state: Arc<Mutex<InternalState>>,
    healthy: Arc<AtomicBool>,
    requests: AtomicU64,
}

impl DynamicMockConnector {
    /// Create a connector advertising single-symbol pricing and history, plus its controller.
    #[must_use]
    pub fn new_with_controller(
        source: DataSource,
    ) -> (Arc<dyn PriceConnector>, DynamicMockController) {
        Self::with_capabilities(
            source,
            &[Capability::CurrentPrice, Capability::HistoricalPrices],
        )
    }

    /// Create a connector advertising exactly `capabilities`, plus its controller.
    #[must_use]
    pub fn with_capabilities(
        source: DataSource,
        capabilities: &[Capability],
    ) -> (Arc<dyn PriceConnector>, DynamicMockController) {
        let state = Arc::new(Mutex::new(InternalState::default()));
        let healthy = Arc::new(AtomicBool::new(true));
        let controller = DynamicMockController {
            state: Arc::clone(&state),
            healthy: Arc::clone(&healthy),
        };
        let me = Arc::new(Self {
            source,
            capabilities: capabilities.iter().copied().collect(),
            state,
            healthy,
            requests: AtomicU64::new(0),
        });
        (me as Arc<dyn PriceConnector>, controller)
    }

    async fn record(&self, capability: Capability) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        *self.state.lock().await.calls.entry(capability).or_default() += 1;
    }

    async fn price_rule(&self, symbol: &str) -> Option<MockBehavior<Option<Quote>>> {
        self.state.lock().await.price_rules.get(&key(symbol)).cloned()
    }
}

#[async_trait]
impl PriceConnector for DynamicMockConnector {
    fn source(&self) -> DataSource {
        self.source
    }

    async fn start(&self) -> Result<(), CambioError> {
        let rule = {
            let mut guard = self.state.lock().await;
            guard.starts += 1;
            guard.start_rule.clone()
        };
        match rule {
            Some(behavior) => behavior.resolve().await,
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), CambioError> {
        self.state.lock().await.stops += 1;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.record(Capability::HealthCheck).await;
        self.healthy.load(Ordering::Relaxed)
    }

    fn stats(&self) -> ClientStats {
        ClientStats {
            source: self.source,
            request_count: self.requests.load(Ordering::Relaxed),
            base_endpoint: format!("mock://{}", self.source),
            has_auth: false,
            rate_limit: RateLimitPolicy::default(),
        }
    }

    fn as_price_provider(&self) -> Option<&dyn PriceProvider> {
        self.capabilities
            .contains(&Capability::CurrentPrice)
            .then_some(self as &dyn PriceProvider)
    }

    fn as_batch_price_provider(&self) -> Option<&dyn BatchPriceProvider> {
        self.capabilities
            .contains(&Capability::MultiplePrices)
            .then_some(self as &dyn BatchPriceProvider)
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        self.capabilities
            .contains(&Capability::HistoricalPrices)
            .then_some(self as &dyn HistoryProvider)
    }
}

#[async_trait]
impl PriceProvider for DynamicMockConnector {
    async fn current_price(
        &self,
        symbol: &str,
        currency: &str,
    ) -> Result<Option<Quote>, CambioError> {
        self.record(Capability::CurrentPrice).await;
        self.state
            .lock()
            .await
            .price_requests
            .push((key(symbol), currency.trim().to_lowercase()));
        // Snapshot the rule so the lock is not held while hanging.
        match self.price_rule(symbol).await {
            Some(behavior) => behavior.resolve().await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BatchPriceProvider for DynamicMockConnector {
    async fn multiple_prices(
        &self,
        symbols: &[String],
        _currency: &str,
    ) -> Result<Vec<Quote>, CambioError> {
        self.record(Capability::MultiplePrices).await;
        self.state
            .lock()
            .await
            .batch_requests
            .push(symbols.iter().map(|s| key(s)).collect());
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(behavior) = self.price_rule(symbol).await
                && let Some(q) = behavior.resolve().await?
            {
                out.push(q);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl HistoryProvider for DynamicMockConnector {
    async fn historical_prices(
        &self,
        symbol: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        self.record(Capability::HistoricalPrices).await;
        let rule = {
            let guard = self.state.lock().await;
            guard.history_rules.get(&key(symbol)).cloned()
        };
        match rule {
            Some(behavior) => behavior.resolve().await,
            None => Ok(Vec::new()),
        }
    }
}
