use std::time::Duration;

use cambio::{CachePolicy, CambioError, Capability, DataSource, Ttl, keys};
use cambio_mock::{DynamicMockConnector, MockBehavior};
use rust_decimal_macros::dec;
use serde_json::json;

use crate::helpers::{quote, registry_of, service_with_memory};

async fn primed() -> (cambio::DataService, cambio_mock::DynamicMockController) {
    let (cg, ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    for (s, p) in [("BTC", dec!(1)), ("ETH", dec!(2))] {
        ctl.set_price_behavior(s, MockBehavior::Return(Some(quote(s, p, DataSource::CoinGecko))))
            .await;
    }
    let (svc, _) = service_with_memory(registry_of(cg));
    for s in ["BTC", "ETH"] {
        svc.current_price(s, "usd", CachePolicy::default())
            .await
            .unwrap();
    }
    (svc, ctl)
}

#[tokio::test]
async fn clear_cache_by_pattern_then_everything() {
    let (svc, _) = primed().await;

    assert_eq!(svc.clear_cache(Some(&keys::price_pattern("btc"))).await.unwrap(), 1);
    assert_eq!(svc.clear_cache(Some("price:BTC:*")).await.unwrap(), 0);
    assert!(svc.cache().exists(&keys::price_key("ETH", "usd")).await);

    assert_eq!(svc.clear_cache(None).await.unwrap(), 1);
    assert_eq!(svc.clear_cache(None).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_pattern_is_invalid() {
    let (svc, _) = primed().await;
    let err = svc.clear_cache(Some("price:[btc")).await.unwrap_err();
    assert!(matches!(err, CambioError::InvalidArg(_)));
    assert_eq!(svc.cache_stats().await.size, 2);
}

#[tokio::test]
async fn undecodable_cache_entry_is_a_miss() {
    let (svc, ctl) = primed().await;
    let key = keys::price_key("BTC", "usd");
    svc.cache()
        .set(&key, json!({"not": "a quote"}), Ttl::Default)
        .await;

    let q = svc
        .current_price("BTC", "usd", CachePolicy::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(q.price(), dec!(1));
    assert_eq!(ctl.calls(Capability::CurrentPrice).await, 3);

    // The refetched value replaced the bad entry.
    svc.current_price("BTC", "usd", CachePolicy::default())
        .await
        .unwrap();
    assert_eq!(ctl.calls(Capability::CurrentPrice).await, 3);
}

#[tokio::test]
async fn explicit_ttl_applies_to_the_written_entry() {
    let (cg, ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    ctl.set_price_behavior(
        "SOL",
        MockBehavior::Return(Some(quote("SOL", dec!(150), DataSource::CoinGecko))),
    )
    .await;
    let (svc, _) = service_with_memory(registry_of(cg));
    svc.current_price("SOL", "usd", CachePolicy::with_ttl(Duration::from_secs(30)))
        .await
        .unwrap();

    let info = svc
        .cache()
        .inspect(&keys::price_key("SOL", "usd"))
        .await
        .unwrap();
    assert!(info.expires_in.is_some_and(|d| d <= Duration::from_secs(30)));
}

#[tokio::test]
async fn stats_track_hits_and_misses() {
    let (svc, _) = primed().await;
    svc.current_price("BTC", "usd", CachePolicy::default())
        .await
        .unwrap();
    let stats = svc.cache_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.size, 2);
}
