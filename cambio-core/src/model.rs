//! Value objects produced by clients and the store.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use cambio_types::{CambioError, DataSource};

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

fn normalize_currency(currency: &str) -> String {
    currency.trim().to_lowercase()
}

/// A point-in-time price for one symbol in one quote currency.
///
/// The symbol is stored upper-case and the currency lower-case regardless of
/// how they were supplied, including when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "QuoteRepr")]
pub struct Quote {
    symbol: String,
    name: Option<String>,
    currency: String,
    price: Decimal,
    market_cap: Option<Decimal>,
    volume_24h: Option<Decimal>,
    change_24h_pct: Option<f64>,
    timestamp: DateTime<Utc>,
    source: DataSource,
}

#[derive(Deserialize)]
struct QuoteRepr {
    symbol: String,
    #[serde(default)]
    name: Option<String>,
    currency: String,
    price: Decimal,
    #[serde(default)]
    market_cap: Option<Decimal>,
    #[serde(default)]
    volume_24h: Option<Decimal>,
    #[serde(default)]
    change_24h_pct: Option<f64>,
    timestamp: DateTime<Utc>,
    source: DataSource,
}

impl From<QuoteRepr> for Quote {
    fn from(r: QuoteRepr) -> Self {
        Self {
            symbol: normalize_symbol(&r.symbol),
            name: r.name,
            currency: normalize_currency(&r.currency),
            price: r.price,
            market_cap: r.market_cap,
            volume_24h: r.volume_24h,
            change_24h_pct: r.change_24h_pct,
            timestamp: r.timestamp,
            source: r.source,
        }
    }
}

impl Quote {
    /// New quote stamped with the current time.
    pub fn new(
        symbol: impl AsRef<str>,
        currency: impl AsRef<str>,
        price: Decimal,
        source: DataSource,
    ) -> Self {
        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            name: None,
            currency: normalize_currency(currency.as_ref()),
            price,
            market_cap: None,
            volume_24h: None,
            change_24h_pct: None,
            timestamp: Utc::now(),
            source,
        }
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach market capitalization.
    #[must_use]
    pub fn with_market_cap(mut self, market_cap: Option<Decimal>) -> Self {
        self.market_cap = market_cap;
        self
    }

    /// Attach 24h traded volume.
    #[must_use]
    pub fn with_volume_24h(mut self, volume: Option<Decimal>) -> Self {
        self.volume_24h = volume;
        self
    }

    /// Attach the 24h change in percent.
    #[must_use]
    pub fn with_change_24h_pct(mut self, change: Option<f64>) -> Self {
        self.change_24h_pct = change;
        self
    }

    /// Override the observation time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Upper-case symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Optional display name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Lower-case quote currency.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Price in `currency`.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Market capitalization, when reported.
    #[must_use]
    pub const fn market_cap(&self) -> Option<Decimal> {
        self.market_cap
    }

    /// 24h volume, when reported.
    #[must_use]
    pub const fn volume_24h(&self) -> Option<Decimal> {
        self.volume_24h
    }

    /// 24h change in percent, when reported.
    #[must_use]
    pub const fn change_24h_pct(&self) -> Option<f64> {
        self.change_24h_pct
    }

    /// Observation time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Provider that produced this quote.
    #[must_use]
    pub const fn source(&self) -> DataSource {
        self.source
    }

    /// Age relative to `now`; a timestamp in the future counts as zero.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

/// One historical observation of a symbol's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HistoricalPointRepr")]
pub struct HistoricalPoint {
    symbol: String,
    timestamp: DateTime<Utc>,
    price: Decimal,
    currency: String,
    volume: Option<Decimal>,
    market_cap: Option<Decimal>,
    source: DataSource,
}

#[derive(Deserialize)]
struct HistoricalPointRepr {
    symbol: String,
    timestamp: DateTime<Utc>,
    price: Decimal,
    currency: String,
    #[serde(default)]
    volume: Option<Decimal>,
    #[serde(default)]
    market_cap: Option<Decimal>,
    source: DataSource,
}

impl From<HistoricalPointRepr> for HistoricalPoint {
    fn from(r: HistoricalPointRepr) -> Self {
        Self {
            symbol: normalize_symbol(&r.symbol),
            timestamp: r.timestamp,
            price: r.price,
            currency: normalize_currency(&r.currency),
            volume: r.volume,
            market_cap: r.market_cap,
            source: r.source,
        }
    }
}

impl HistoricalPoint {
    /// New history point.
    pub fn new(
        symbol: impl AsRef<str>,
        timestamp: DateTime<Utc>,
        price: Decimal,
        currency: impl AsRef<str>,
        source: DataSource,
    ) -> Self {
        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            timestamp,
            price,
            currency: normalize_currency(currency.as_ref()),
            volume: None,
            market_cap: None,
            source,
        }
    }

    /// Attach traded volume.
    #[must_use]
    pub fn with_volume(mut self, volume: Option<Decimal>) -> Self {
        self.volume = volume;
        self
    }

    /// Attach market capitalization.
    #[must_use]
    pub fn with_market_cap(mut self, market_cap: Option<Decimal>) -> Self {
        self.market_cap = market_cap;
        self
    }

    /// Upper-case symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Observation time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Price in `currency`.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Lower-case quote currency.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Traded volume, when reported.
    #[must_use]
    pub const fn volume(&self) -> Option<Decimal> {
        self.volume
    }

    /// Market capitalization, when reported.
    #[must_use]
    pub const fn market_cap(&self) -> Option<Decimal> {
        self.market_cap
    }

    /// Provider that produced this point.
    #[must_use]
    pub const fn source(&self) -> DataSource {
        self.source
    }
}

/// Body of a response: parsed JSON when it parses, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body parsed as JSON.
    Json(serde_json::Value),
    /// Body that was not valid JSON.
    Text(String),
}

/// Result of one network attempt. Never persisted.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// Decoded body.
    pub payload: Payload,
    /// HTTP status code.
    pub status: u16,
    /// Response headers with UTF-8 values, lower-case names.
    pub headers: BTreeMap<String, String>,
    /// Time from sending the request to reading the full body.
    pub elapsed: Duration,
    /// Client that performed the request.
    pub source: DataSource,
    /// Wall-clock time the body was received.
    pub received_at: DateTime<Utc>,
}

impl ResponseEnvelope {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// JSON body, if the payload parsed as JSON.
    #[must_use]
    pub const fn json(&self) -> Option<&serde_json::Value> {
        match &self.payload {
            Payload::Json(v) => Some(v),
            Payload::Text(_) => None,
        }
    }

    /// Deserialize the JSON body into `T`.
    ///
    /// # Errors
    /// Returns `CambioError::Data` when the body is not JSON or has the wrong shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CambioError> {
        let value = self.json().ok_or_else(|| {
            CambioError::Data(format!("{} returned a non-JSON body", self.source))
        })?;
        T::deserialize(value).map_err(|e| CambioError::Data(format!("{}: {e}", self.source)))
    }
}
