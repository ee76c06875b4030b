//! Provider identity tags.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CambioError;

/// Identifies the provider a quote or history point came from.
///
/// The set is closed: new providers are added here and wired into the
/// registry at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DataSource {
    /// CoinGecko public/demo API.
    CoinGecko,
    /// CoinMarketCap professional API.
    CoinMarketCap,
    /// Binance exchange API.
    Binance,
    /// Manually entered data.
    Manual,
}

impl DataSource {
    /// Stable lowercase identifier, also used as the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CoinGecko => "coingecko",
            Self::CoinMarketCap => "coinmarketcap",
            Self::Binance => "binance",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = CambioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coingecko" => Ok(Self::CoinGecko),
            "coinmarketcap" => Ok(Self::CoinMarketCap),
            "binance" => Ok(Self::Binance),
            "manual" => Ok(Self::Manual),
            other => Err(CambioError::InvalidArg(format!(
                "unknown data source: {other}"
            ))),
        }
    }
}
