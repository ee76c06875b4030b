use chrono::{Duration, NaiveTime};
use rust_decimal::Decimal;

use cambio_core::{DataSource, DateTime, HistoricalPoint, Utc};

use super::quotes;

/// One point per UTC midnight in `[start, end]`, drifting one unit per day from the fixture price.
pub fn by_symbol(
    symbol: &str,
    currency: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    source: DataSource,
) -> Option<Vec<HistoricalPoint>> {
    let base = quotes::by_symbol(symbol, currency, source)?.price();
    let mut day = start.date_naive().and_time(NaiveTime::MIN).and_utc();
    if day < start {
        day += Duration::days(1);
    }
    let mut out = Vec::new();
    let mut offset = Decimal::ZERO;
    while day <= end {
        out.push(
            HistoricalPoint::new(symbol, day, base + offset, currency, source)
                .with_volume(Some(Decimal::from(1_000_000))),
        );
        offset += Decimal::ONE;
        day += Duration::days(1);
    }
    Some(out)
}
