use std::sync::Arc;

use cambio::{CachePolicy, CambioError, DataSource, PriceStore, Utc};
use cambio_mock::{DynamicMockConnector, FailingStore, MockBehavior};
use rust_decimal_macros::dec;

use crate::helpers::{quote, registry_of, service_with, service_with_memory};

async fn failing_primary() -> Arc<dyn cambio::PriceConnector> {
    let (cg, ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    ctl.set_price_behavior(
        "BTC",
        MockBehavior::Fail(CambioError::transient("coingecko", "503")),
    )
    .await;
    cg
}

#[tokio::test]
async fn fresh_stored_quote_stands_in_for_failed_fetch() {
    let (svc, store) = service_with_memory(registry_of(failing_primary().await));
    let stored = quote("BTC", dec!(64000), DataSource::Binance)
        .with_timestamp(Utc::now() - chrono::Duration::minutes(10));
    store.save_current_price(&stored).await.unwrap();

    let got = svc
        .current_price("BTC", "usd", CachePolicy::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.price(), dec!(64000));
    assert_eq!(got.source(), DataSource::Binance);
}

#[tokio::test]
async fn stale_stored_quote_is_ignored() {
    let (svc, store) = service_with_memory(registry_of(failing_primary().await));
    let stored = quote("BTC", dec!(64000), DataSource::Binance)
        .with_timestamp(Utc::now() - chrono::Duration::hours(2));
    store.save_current_price(&stored).await.unwrap();

    let got = svc
        .current_price("BTC", "usd", CachePolicy::default())
        .await
        .unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn failing_store_does_not_break_a_fresh_fetch() {
    let (cg, ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    ctl.set_price_behavior(
        "ETH",
        MockBehavior::Return(Some(quote("ETH", dec!(3200), DataSource::CoinGecko))),
    )
    .await;
    let store = Arc::new(FailingStore::new());
    let svc = service_with(registry_of(cg), Arc::clone(&store) as Arc<dyn PriceStore>);

    let got = svc
        .current_price("ETH", "usd", CachePolicy::default())
        .await
        .unwrap();
    assert_eq!(got.map(|q| q.price()), Some(dec!(3200)));
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn failing_store_and_failing_providers_yield_none() {
    let store = Arc::new(FailingStore::new());
    let svc = service_with(
        registry_of(failing_primary().await),
        Arc::clone(&store) as Arc<dyn PriceStore>,
    );

    let got = svc
        .current_price("BTC", "usd", CachePolicy::default())
        .await
        .unwrap();
    assert!(got.is_none());
    assert_eq!(store.calls(), 1);
}
