//! cambio-mock
//!
//! Test doubles for the cambio workspace:
//! - [`MockConnector`] serves deterministic fixture data and reacts to the
//!   reserved symbols `FAIL` and `TIMEOUT`.
//! - [`DynamicMockConnector`] defers every call to a [`DynamicMockController`]
//!   so tests can script successes, failures, and hangs per symbol.
//! - [`FailingStore`] rejects every persistence call.
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cambio_core::{
    BatchPriceProvider, CambioError, ClientStats, DataSource, DateTime, HistoricalPoint,
    HistoryProvider, PriceConnector, PriceProvider, Quote, RateLimitPolicy, Utc,
};

mod dynamic;
mod fixtures;
mod store;

pub use dynamic::{DynamicMockConnector, DynamicMockController, MockBehavior};
pub use store::FailingStore;

/// Symbol that makes every [`MockConnector`] call fail with a connector error.
pub const FAIL_SYMBOL: &str = "FAIL";
/// Symbol that makes every [`MockConnector`] call stall for [`TIMEOUT_DELAY`] first.
pub const TIMEOUT_SYMBOL: &str = "TIMEOUT";
/// Stall applied to [`TIMEOUT_SYMBOL`] lookups.
pub const TIMEOUT_DELAY: Duration = Duration::from_millis(200);

/// Fixture-backed connector for CI-safe tests and demos.
///
/// Knows BTC, ETH, SOL, and ADA in `usd`, plus BTC and ETH in `eur`.
#[derive(Debug)]
pub struct MockConnector {
    source: DataSource,
    calls: AtomicU64,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new(DataSource::Manual)
    }
}

impl MockConnector {
    /// Fixture connector reporting itself as `source`.
    #[must_use]
    pub const fn new(source: DataSource) -> Self {
        Self {
            source,
            calls: AtomicU64::new(0),
        }
    }

    async fn maybe_fail_or_timeout(&self, symbol: &str, what: &str) -> Result<(), CambioError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match symbol {
            FAIL_SYMBOL => Err(CambioError::connector(
                self.source.as_str(),
                format!("forced failure: {what}"),
            )),
            TIMEOUT_SYMBOL => {
                tokio::time::sleep(TIMEOUT_DELAY).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn fold(symbol: &str, currency: &str) -> (String, String) {
    (
        symbol.trim().to_uppercase(),
        currency.trim().to_lowercase(),
    )
}

#[async_trait]
impl PriceConnector for MockConnector {
    fn source(&self) -> DataSource {
        self.source
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn stats(&self) -> ClientStats {
        ClientStats {
            source: self.source,
            request_count: self.calls.load(Ordering::Relaxed),
            base_endpoint: format!("mock://{}", self.source),
            has_auth: false,
            rate_limit: RateLimitPolicy::default(),
        }
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
impl PriceProvider for MockConnector {
    async fn current_price(
        &self,
        symbol: &str,
        currency: &str,
    ) -> Result<Option<Quote>, CambioError> {
        let (symbol, currency) = fold(symbol, currency);
        self.maybe_fail_or_timeout(&symbol, "current-price").await?;
        Ok(fixtures::quotes::by_symbol(&symbol, &currency, self.source))
    }
}

#[async_trait]
impl BatchPriceProvider for MockConnector {
    async fn multiple_prices(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<Vec<Quote>, CambioError> {
        let mut out = Vec::with_capacity(symbols.len());
        for s in symbols {
            let (symbol, currency) = fold(s, currency);
            self.maybe_fail_or_timeout(&symbol, "multiple-prices").await?;
            out.extend(fixtures::quotes::by_symbol(&symbol, &currency, self.source));
        }
        Ok(out)
    }
}

#[async_trait]
impl HistoryProvider for MockConnector {
    async fn historical_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        let (symbol, currency) = fold(symbol, currency);
        self.maybe_fail_or_timeout(&symbol, "historical-prices").await?;
        if start > end {
            return Err(CambioError::InvalidArg(
                "history range starts after it ends".into(),
            ));
        }
        Ok(
            fixtures::history::by_symbol(&symbol, &currency, start, end, self.source)
                .unwrap_or_default(),
        )
    }
}
