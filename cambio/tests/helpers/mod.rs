// Shared fixtures so tests can `use crate::helpers::*;`
#![allow(dead_code)]

use std::sync::Arc;

use cambio::{
    CacheConfig, ClientRegistry, DataService, DataSource, DateTime, Decimal, HistoricalPoint,
    MemoryStore, PriceConnector, PriceStore, Quote, ServiceConfig, Utc,
};
use chrono::TimeZone;

/// Route `tracing` output through the test harness; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Quote stamped now.
pub fn quote(symbol: &str, price: Decimal, source: DataSource) -> Quote {
    Quote::new(symbol, "usd", price, source)
}

/// UTC midnight of the given day.
pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
        .single()
        .expect("valid test date")
}

/// One daily point per day in `[from, to]`, priced at `base + offset`.
pub fn daily_points(
    symbol: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    base: Decimal,
    source: DataSource,
) -> Vec<HistoricalPoint> {
    let mut out = Vec::new();
    let mut ts = from;
    let mut price = base;
    while ts <= to {
        out.push(HistoricalPoint::new(symbol, ts, price, "usd", source));
        ts += chrono::Duration::days(1);
        price += Decimal::ONE;
    }
    out
}

/// Registry with a single primary connector.
pub fn registry_of(primary: Arc<dyn PriceConnector>) -> ClientRegistry {
    ClientRegistry::builder()
        .primary(primary)
        .build()
        .expect("valid registry")
}

/// Service over `registry` with a small cache and `store`.
pub fn service_with(registry: ClientRegistry, store: Arc<dyn PriceStore>) -> DataService {
    init_tracing();
    DataService::builder()
        .registry(registry)
        .store(store)
        .cache_config(CacheConfig {
            max_size: 64,
            ..CacheConfig::default()
        })
        .config(ServiceConfig {
            history_source: DataSource::Binance,
            ..ServiceConfig::default()
        })
        .build()
        .expect("valid service")
}

/// Service over `registry` with a fresh in-memory store, which is also returned.
pub fn service_with_memory(registry: ClientRegistry) -> (DataService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let svc = service_with(registry, Arc::clone(&store) as Arc<dyn PriceStore>);
    (svc, store)
}
