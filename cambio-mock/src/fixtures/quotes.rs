use std::str::FromStr;

use cambio_core::{DataSource, Decimal, Quote, Utc};

/// Fixture price of `symbol` in `currency`, as `(name, price)`.
pub fn price_of(symbol: &str, currency: &str) -> Option<(&'static str, &'static str)> {
    match (symbol, currency) {
        ("BTC", "usd") => Some(("Bitcoin", "65000.00")),
        ("BTC", "eur") => Some(("Bitcoin", "60000.00")),
        ("ETH", "usd") => Some(("Ethereum", "3200.00")),
        ("ETH", "eur") => Some(("Ethereum", "2950.00")),
        ("SOL", "usd") => Some(("Solana", "150.00")),
        ("ADA", "usd") => Some(("Cardano", "0.45")),
        _ => None,
    }
}

pub fn by_symbol(symbol: &str, currency: &str, source: DataSource) -> Option<Quote> {
    let (name, px) = price_of(symbol, currency)?;
    let price = Decimal::from_str(px).ok()?;
    Some(
        Quote::new(symbol, currency, price, source)
            .with_name(name)
            .with_timestamp(Utc::now()),
    )
}
