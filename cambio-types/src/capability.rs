use core::fmt;
use serde::{Deserialize, Serialize};

/// Capability labels for routing, errors, and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Point-in-time price for a single symbol.
    CurrentPrice,
    /// Prices for several symbols in one request.
    MultiplePrices,
    /// Price history over a time range.
    HistoricalPrices,
    /// Liveness check against the provider.
    HealthCheck,
}

impl Capability {
    /// Stable, kebab-case identifier for logs/errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentPrice => "current-price",
            Self::MultiplePrices => "multiple-prices",
            Self::HistoricalPrices => "historical-prices",
            Self::HealthCheck => "health-check",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
