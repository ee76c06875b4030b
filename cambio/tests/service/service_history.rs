use std::sync::Arc;

use async_trait::async_trait;
use cambio::{
    CachePolicy, CambioError, Capability, ClientRegistry, DataSource, DateTime, HistoricalPoint,
    MemoryStore, PriceStore, Quote, Utc, keys,
};
use cambio_mock::{DynamicMockConnector, MockBehavior};
use rust_decimal_macros::dec;

use crate::helpers::{daily_points, day, registry_of, service_with, service_with_memory};

#[tokio::test]
async fn covered_range_is_served_from_store_without_network() {
    let (bn, ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    let (svc, store) = service_with_memory(registry_of(bn));
    let points = daily_points("BTC", day(2024, 1, 1), day(2024, 1, 10), dec!(100), DataSource::Binance);
    store.save_historical_prices(&points).await.unwrap();

    let got = svc
        .historical_prices("BTC", day(2024, 1, 2), day(2024, 1, 5), "usd", CachePolicy::default())
        .await
        .unwrap();

    assert_eq!(got.len(), 4);
    assert_eq!(got[0].price(), dec!(101));
    assert_eq!(ctl.calls(Capability::HistoricalPrices).await, 0);
    let key = keys::history_key("BTC", day(2024, 1, 2), day(2024, 1, 5), "usd");
    assert!(svc.cache().exists(&key).await);
}

/// Memory store that returns history newest first.
struct NewestFirstStore(MemoryStore);

#[async_trait]
impl PriceStore for NewestFirstStore {
    async fn save_current_price(&self, quote: &Quote) -> Result<bool, CambioError> {
        self.0.save_current_price(quote).await
    }

    async fn get_current_price(
        &self,
        symbol: &str,
        currency: &str,
        source: Option<DataSource>,
    ) -> Result<Option<Quote>, CambioError> {
        self.0.get_current_price(symbol, currency, source).await
    }

    async fn save_historical_prices(
        &self,
        points: &[HistoricalPoint],
    ) -> Result<usize, CambioError> {
        self.0.save_historical_prices(points).await
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        currency: &str,
    ) -> Result<Vec<HistoricalPoint>, CambioError> {
        let mut points = self
            .0
            .get_historical_prices(symbol, start, end, currency)
            .await?;
        points.reverse();
        Ok(points)
    }

    async fn cleanup_old_data(&self, days_to_keep: u32) -> Result<u64, CambioError> {
        self.0.cleanup_old_data(days_to_keep).await
    }

    async fn close(&self) -> Result<(), CambioError> {
        self.0.close().await
    }
}

#[tokio::test]
async fn store_coverage_does_not_depend_on_point_order() {
    let (bn, ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    let store = Arc::new(NewestFirstStore(MemoryStore::new()));
    let points = daily_points("BTC", day(2024, 1, 1), day(2024, 1, 10), dec!(100), DataSource::Binance);
    store.save_historical_prices(&points).await.unwrap();
    let svc = service_with(registry_of(bn), Arc::clone(&store) as Arc<dyn PriceStore>);

    let got = svc
        .historical_prices("BTC", day(2024, 1, 3), day(2024, 1, 6), "usd", CachePolicy::default())
        .await
        .unwrap();

    assert_eq!(got.len(), 4);
    assert_eq!(ctl.calls(Capability::HistoricalPrices).await, 0);
}

#[tokio::test]
async fn partial_coverage_fetches_persists_and_caches() {
    let (bn, ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    let fetched = daily_points("ETH", day(2024, 3, 1), day(2024, 3, 5), dec!(3000), DataSource::Binance);
    ctl.set_history_behavior("ETH", MockBehavior::Return(fetched.clone()))
        .await;
    let (svc, store) = service_with_memory(registry_of(bn));
    store
        .save_historical_prices(&fetched[2..])
        .await
        .unwrap();

    let first = svc
        .historical_prices("ETH", day(2024, 3, 1), day(2024, 3, 5), "usd", CachePolicy::default())
        .await
        .unwrap();
    assert_eq!(first, fetched);
    assert_eq!(ctl.calls(Capability::HistoricalPrices).await, 1);

    let stored = store
        .get_historical_prices("ETH", day(2024, 3, 1), day(2024, 3, 5), "usd")
        .await
        .unwrap();
    assert_eq!(stored.len(), 5);

    let second = svc
        .historical_prices("ETH", day(2024, 3, 1), day(2024, 3, 5), "usd", CachePolicy::default())
        .await
        .unwrap();
    assert_eq!(second, fetched);
    assert_eq!(ctl.calls(Capability::HistoricalPrices).await, 1);
}

#[tokio::test]
async fn empty_provider_history_is_not_cached() {
    let (bn, ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    let (svc, _) = service_with_memory(registry_of(bn));

    for _ in 0..2 {
        let got = svc
            .historical_prices("ADA", day(2024, 1, 1), day(2024, 1, 2), "usd", CachePolicy::default())
            .await
            .unwrap();
        assert!(got.is_empty());
    }
    assert_eq!(ctl.calls(Capability::HistoricalPrices).await, 2);
    assert_eq!(svc.cache_stats().await.size, 0);
}

#[tokio::test]
async fn provider_failure_yields_empty_history() {
    let (bn, ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    ctl.set_history_behavior(
        "BTC",
        MockBehavior::Fail(CambioError::transient("binance", "reset")),
    )
    .await;
    let (svc, _) = service_with_memory(registry_of(bn));
    let got = svc
        .historical_prices("BTC", day(2024, 1, 1), day(2024, 1, 2), "usd", CachePolicy::default())
        .await
        .unwrap();
    assert!(got.is_empty());
}

#[tokio::test]
async fn unregistered_history_source_falls_back_to_primary() {
    // The test service is configured to read history from Binance.
    let (cg, cg_ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let points = daily_points("SOL", day(2024, 1, 1), day(2024, 1, 2), dec!(90), DataSource::CoinGecko);
    cg_ctl
        .set_history_behavior("SOL", MockBehavior::Return(points.clone()))
        .await;
    let svc = service_with(
        registry_of(cg),
        Arc::new(MemoryStore::new()) as Arc<dyn PriceStore>,
    );

    let got = svc
        .historical_prices("SOL", day(2024, 1, 1), day(2024, 1, 2), "usd", CachePolicy::bypass())
        .await
        .unwrap();
    assert_eq!(got, points);
    assert_eq!(svc.cache_stats().await.size, 0);
}

#[tokio::test]
async fn configured_history_source_is_preferred_over_primary() {
    let (cg, cg_ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (bn, bn_ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    bn_ctl
        .set_history_behavior(
            "BTC",
            MockBehavior::Return(daily_points(
                "BTC",
                day(2024, 1, 1),
                day(2024, 1, 1),
                dec!(1),
                DataSource::Binance,
            )),
        )
        .await;
    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .build()
        .unwrap();
    let (svc, _) = service_with_memory(registry);

    let got = svc
        .historical_prices("BTC", day(2024, 1, 1), day(2024, 1, 1), "usd", CachePolicy::default())
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(cg_ctl.calls(Capability::HistoricalPrices).await, 0);
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let (bn, ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    let (svc, _) = service_with_memory(registry_of(bn));
    let err = svc
        .historical_prices("BTC", day(2024, 2, 1), day(2024, 1, 1), "usd", CachePolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CambioError::InvalidArg(_)));
    assert_eq!(ctl.calls(Capability::HistoricalPrices).await, 0);
}
