use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{HistoricalPoint, Quote};
use cambio_types::{CambioError, DataSource, RateLimitPolicy};

/// Currencies assumed when a provider cannot list its own.
pub const DEFAULT_SUPPORTED_CURRENCIES: &[&str] = &["usd", "eur", "btc", "eth"];

/// Focused role trait for connectors that provide single-symbol prices.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch the current price of `symbol` in `currency`.
    ///
    /// `Ok(None)` means the provider does not know the symbol; it is not an error.
    async fn current_price(
        &self,
        symbol: &str,
        currency: &str,
    ) -> Result<Option<Quote>, CambioError>;
}

/// Focused role trait for connectors that can price several symbols in one request.
#[async_trait]
pub trait BatchPriceProvider: Send + Sync {
    /// Fetch current prices for `symbols`; unknown symbols are omitted from the result.
    async fn multiple_prices(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<Vec<Quote>, CambioError>;
}

/// Focused role trait for connectors that provide price history.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch observations of `symbol` with timestamps in `[start, end]`.
    async fn historical_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError>;
}

/// Observability snapshot of one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientStats {
    /// Provider tag.
    pub source: DataSource,
    /// Responses received so far.
    pub request_count: u64,
    /// Base URL requests are sent to.
    pub base_endpoint: String,
    /// Whether an API key is configured.
    pub has_auth: bool,
    /// Rate limit policy in force.
    pub rate_limit: RateLimitPolicy,
}

/// A market-data provider client.
///
/// Capabilities are discovered through the `as_*_provider` accessors; a
/// connector that cannot serve a capability leaves the default `None`.
#[async_trait]
pub trait PriceConnector: Send + Sync {
    /// Provider tag; unique within a registry.
    fn source(&self) -> DataSource;

    /// Stable name used in logs and errors.
    fn name(&self) -> &'static str {
        self.source().as_str()
    }

    /// Acquire the underlying session. Idempotent.
    async fn start(&self) -> Result<(), CambioError> {
        Ok(())
    }

    /// Release the underlying session.
    async fn stop(&self) -> Result<(), CambioError> {
        Ok(())
    }

    /// Cheap liveness check.
    async fn health_check(&self) -> bool;

    /// Observability snapshot.
    fn stats(&self) -> ClientStats;

    /// Quote currencies this provider accepts.
    async fn supported_currencies(&self) -> Result<Vec<String>, CambioError> {
        Ok(DEFAULT_SUPPORTED_CURRENCIES
            .iter()
            .map(|c| (*c).to_string())
            .collect())
    }

    /// Advertise single-symbol pricing.
    fn as_price_provider(&self) -> Option<&dyn PriceProvider> {
        None
    }

    /// Advertise batched pricing.
    fn as_batch_price_provider(&self) -> Option<&dyn BatchPriceProvider> {
        None
    }

    /// Advertise price history.
    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        None
    }
}
