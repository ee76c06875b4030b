//! Persistence seam consumed by the data service.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::log::{debug, warn};
use crate::model::{HistoricalPoint, Quote};
use cambio_types::{CambioError, DataSource};

/// Durable storage for quotes and price history.
///
/// Implementations provide their own internal consistency; callers add no locking.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Upsert the latest quote for `(symbol, currency, source)`.
    async fn save_current_price(&self, quote: &Quote) -> Result<bool, CambioError>;

    /// Most recent quote for `symbol`/`currency`, optionally restricted to one source.
    async fn get_current_price(
        &self,
        symbol: &str,
        currency: &str,
        source: Option<DataSource>,
    ) -> Result<Option<Quote>, CambioError>;

    /// Upsert history points; returns how many were written.
    async fn save_historical_prices(&self, points: &[HistoricalPoint])
    -> Result<usize, CambioError>;

    /// Points with timestamps in `[start, end]`, ascending.
    async fn get_historical_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError>;

    /// Delete history older than `days_to_keep` days; returns the number removed.
    async fn cleanup_old_data(&self, days_to_keep: u32) -> Result<u64, CambioError>;

    /// Release resources. Further calls fail.
    async fn close(&self) -> Result<(), CambioError>;
}

type SeriesKey = (String, String, DataSource);

#[derive(Debug, Default)]
struct Tables {
    closed: bool,
    current: HashMap<SeriesKey, Quote>,
    history: HashMap<SeriesKey, BTreeMap<DateTime<Utc>, HistoricalPoint>>,
}

/// In-process [`PriceStore`].
///
/// One current-price row per symbol/currency/source and one history row per
/// symbol/timestamp/currency/source, so repeated saves overwrite.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self) -> Result<MutexGuard<'_, Tables>, CambioError> {
        let guard = self.tables.lock().unwrap_or_else(|poisoned| {
            warn!("memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        });
        if guard.closed {
            return Err(CambioError::store("store is closed"));
        }
        Ok(guard)
    }
}

fn key(symbol: &str, currency: &str, source: DataSource) -> SeriesKey {
    (
        symbol.trim().to_uppercase(),
        currency.trim().to_lowercase(),
        source,
    )
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn save_current_price(&self, quote: &Quote) -> Result<bool, CambioError> {
        let mut tables = self.open()?;
        tables.current.insert(
            key(quote.symbol(), quote.currency(), quote.source()),
            quote.clone(),
        );
        Ok(true)
    }

    async fn get_current_price(
        &self,
        symbol: &str,
        currency: &str,
        source: Option<DataSource>,
    ) -> Result<Option<Quote>, CambioError> {
        let tables = self.open()?;
        let (symbol, currency, _) = key(symbol, currency, DataSource::Manual);
        Ok(tables
            .current
            .iter()
            .filter(|((s, c, src), _)| {
                *s == symbol && *c == currency && source.is_none_or(|want| want == *src)
            })
            .map(|(_, q)| q)
            .max_by_key(|q| q.timestamp())
            .cloned())
    }

    async fn save_historical_prices(
        &self,
        points: &[HistoricalPoint],
    ) -> Result<usize, CambioError> {
        let mut tables = self.open()?;
        for p in points {
            tables
                .history
                .entry(key(p.symbol(), p.currency(), p.source()))
                .or_default()
                .insert(p.timestamp(), p.clone());
        }
        debug!(saved = points.len(), "history points saved");
        Ok(points.len())
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        let tables = self.open()?;
        if start > end {
            return Ok(Vec::new());
        }
        let (symbol, currency, _) = key(symbol, currency, DataSource::Manual);
        let mut out: Vec<HistoricalPoint> = tables
            .history
            .iter()
            .filter(|((s, c, _), _)| *s == symbol && *c == currency)
            .flat_map(|(_, series)| series.range(start..=end).map(|(_, p)| p.clone()))
            .collect();
        out.sort_by_key(HistoricalPoint::timestamp);
        Ok(out)
    }

    async fn cleanup_old_data(&self, days_to_keep: u32) -> Result<u64, CambioError> {
        let mut tables = self.open()?;
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days_to_keep));
        let mut removed = 0u64;
        for series in tables.history.values_mut() {
            let kept = series.split_off(&cutoff);
            removed += series.len() as u64;
            *series = kept;
        }
        tables.history.retain(|_, series| !series.is_empty());
        Ok(removed)
    }

    async fn close(&self) -> Result<(), CambioError> {
        let mut tables = self.tables.lock().unwrap_or_else(|poisoned| {
            warn!("memory store mutex was poisoned, recovering");
            poisoned.into_inner()
        });
        tables.closed = true;
        tables.current.clear();
        tables.history.clear();
        Ok(())
    }
}
