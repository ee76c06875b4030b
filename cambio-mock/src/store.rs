use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cambio_core::{CambioError, DataSource, DateTime, HistoricalPoint, PriceStore, Quote, Utc};

/// A `PriceStore` whose every call fails, for exercising degraded paths.
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    /// New store; nothing has been called yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    /// Calls attempted so far, across all operations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self, op: &str) -> Result<T, CambioError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(CambioError::store(format!("{op}: store unavailable")))
    }
}

#[async_trait]
impl PriceStore for FailingStore {
    async fn save_current_price(&self, _quote: &Quote) -> Result<bool, CambioError> {
        self.fail("save_current_price")
    }

    async fn get_current_price(
        &self,
        _symbol: &str,
        _currency: &str,
        _source: Option<DataSource>,
    ) -> Result<Option<Quote>, CambioError> {
        self.fail("get_current_price")
    }

    async fn save_historical_prices(
        &self,
        _points: &[HistoricalPoint],
    ) -> Result<usize, CambioError> {
        self.fail("save_historical_prices")
    }

    async fn get_historical_prices(
        &self,
        _symbol: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        self.fail("get_historical_prices")
    }

    async fn cleanup_old_data(&self, _days_to_keep: u32) -> Result<u64, CambioError> {
        self.fail("cleanup_old_data")
    }

    async fn close(&self) -> Result<(), CambioError> {
        self.fail("close")
    }
}
