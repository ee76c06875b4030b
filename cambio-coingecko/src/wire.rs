//! Decoding of CoinGecko JSON payloads into cambio value objects.

use std::collections::HashMap;
use std::str::FromStr;

use cambio_core::{
    CambioError, DataSource, DateTime, Decimal, HistoricalPoint, Quote, Utc,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct CoinListEntry {
    pub id: String,
    pub symbol: String,
}

/// `symbol -> id`, keeping the first id listed for each symbol.
pub(crate) fn index_coin_list(entries: Vec<CoinListEntry>) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(entries.len());
    for e in entries {
        let symbol = e.symbol.trim().to_lowercase();
        if symbol.is_empty() || e.id.is_empty() {
            continue;
        }
        out.entry(symbol).or_insert(e.id);
    }
    out
}

pub(crate) fn decimal(v: &Value) -> Option<Decimal> {
    let Value::Number(n) = v else {
        return None;
    };
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok()))
}

fn non_zero(v: Option<&Value>) -> Option<Decimal> {
    v.and_then(decimal).filter(|d| !d.is_zero())
}

/// `"wrapped-bitcoin"` -> `"Wrapped Bitcoin"`.
pub(crate) fn display_name(coin_id: &str) -> String {
    coin_id
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a quote from one `simple/price` entry; `None` when the currency is absent.
pub(crate) fn quote_from_simple_price(
    symbol: &str,
    coin_id: &str,
    currency: &str,
    data: &Value,
) -> Option<Quote> {
    let price = data.get(currency).and_then(decimal)?;
    let updated = data
        .get("last_updated_at")
        .and_then(Value::as_i64)
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now);
    Some(
        Quote::new(symbol, currency, price, DataSource::CoinGecko)
            .with_name(display_name(coin_id))
            .with_market_cap(non_zero(data.get(format!("{currency}_market_cap"))))
            .with_volume_24h(non_zero(data.get(format!("{currency}_24h_vol"))))
            .with_change_24h_pct(data.get(format!("{currency}_24h_change")).and_then(Value::as_f64))
            .with_timestamp(updated),
    )
}

fn series(body: &Value, field: &str) -> Vec<(i64, Value)> {
    body.get(field)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let pair = row.as_array()?;
                    let ms = pair.first()?.as_f64()? as i64;
                    Some((ms, pair.get(1)?.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a `market_chart` body, keeping points within `[start, end]`.
///
/// # Errors
/// Returns `Data` when the body lacks a `prices` array.
pub(crate) fn chart_points(
    symbol: &str,
    currency: &str,
    body: &Value,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<HistoricalPoint>, CambioError> {
    if !body.get("prices").is_some_and(Value::is_array) {
        return Err(CambioError::Data("coingecko chart without prices".into()));
    }
    let volumes: HashMap<i64, Value> = series(body, "total_volumes").into_iter().collect();
    let caps: HashMap<i64, Value> = series(body, "market_caps").into_iter().collect();

    Ok(series(body, "prices")
        .into_iter()
        .filter_map(|(ms, price)| {
            let ts = DateTime::from_timestamp_millis(ms)?;
            if ts < start || ts > end {
                return None;
            }
            let price = decimal(&price)?;
            Some(
                HistoricalPoint::new(symbol, ts, price, currency, DataSource::CoinGecko)
                    .with_volume(non_zero(volumes.get(&ms)))
                    .with_market_cap(non_zero(caps.get(&ms))),
            )
        })
        .collect())
}
