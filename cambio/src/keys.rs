//! Cache key layout used by the data service.

use chrono::{DateTime, Utc};

/// `price:{SYMBOL}:{currency}`.
#[must_use]
pub fn price_key(symbol: &str, currency: &str) -> String {
    format!(
        "price:{}:{}",
        symbol.trim().to_uppercase(),
        currency.trim().to_lowercase()
    )
}

/// `historical:{SYMBOL}:{YYYYMMDD}:{YYYYMMDD}:{currency}`; day granularity.
#[must_use]
pub fn history_key(
    symbol: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    currency: &str,
) -> String {
    format!(
        "historical:{}:{}:{}:{}",
        symbol.trim().to_uppercase(),
        start.format("%Y%m%d"),
        end.format("%Y%m%d"),
        currency.trim().to_lowercase()
    )
}

/// Glob matching every cached price of `symbol`, in any currency.
#[must_use]
pub fn price_pattern(symbol: &str) -> String {
    format!("price:{}:*", symbol.trim().to_uppercase())
}
