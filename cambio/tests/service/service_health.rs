use std::sync::Arc;

use cambio::{CambioError, ClientRegistry, DataService, DataSource, PriceStore};
use cambio_mock::{DynamicMockConnector, FailingStore, MockConnector};

use crate::helpers::{daily_points, day, registry_of, service_with, service_with_memory};

#[tokio::test]
async fn healthy_components_report_healthy() {
    let (svc, _) = service_with_memory(registry_of(Arc::new(MockConnector::new(
        DataSource::Manual,
    ))));
    let report = svc.health_check().await;
    assert!(report.store);
    assert!(report.cache);
    assert_eq!(report.providers.get(&DataSource::Manual), Some(&true));
    assert!(report.is_healthy());
    // The health-check entry does not linger.
    assert_eq!(svc.cache_stats().await.size, 0);
}

#[tokio::test]
async fn each_component_is_checked_independently() {
    let (cg, ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    ctl.set_healthy(false);
    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(Arc::new(MockConnector::new(DataSource::Manual)))
        .build()
        .unwrap();
    let svc = service_with(registry, Arc::new(FailingStore::new()) as Arc<dyn PriceStore>);

    let report = svc.health_check().await;
    assert!(!report.store);
    assert!(report.cache);
    assert_eq!(report.providers.get(&DataSource::CoinGecko), Some(&false));
    assert_eq!(report.providers.get(&DataSource::Manual), Some(&true));
    assert!(!report.is_healthy());
}

#[tokio::test]
async fn start_and_shutdown_drive_every_component() {
    let (cg, ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (svc, store) = service_with_memory(registry_of(cg));

    svc.start().await.unwrap();
    assert!(svc.cache().is_running());
    assert_eq!(ctl.lifecycle_calls().await, (1, 0));

    svc.shutdown().await.unwrap();
    assert!(!svc.cache().is_running());
    assert_eq!(ctl.lifecycle_calls().await, (1, 1));
    assert!(matches!(
        store.get_current_price("BTC", "usd", None).await,
        Err(CambioError::Store(_))
    ));
}

#[tokio::test]
async fn shutdown_reports_store_failure_after_stopping_clients() {
    let (cg, ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let svc = service_with(registry_of(cg), Arc::new(FailingStore::new()) as Arc<dyn PriceStore>);
    svc.start().await.unwrap();

    match svc.shutdown().await.unwrap_err() {
        CambioError::Lifecycle(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], CambioError::Store(_)));
        }
        other => panic!("expected Lifecycle, got {other:?}"),
    }
    assert_eq!(ctl.lifecycle_calls().await, (1, 1));
}

#[tokio::test]
async fn cleanup_delegates_to_store() {
    let (svc, store) = service_with_memory(registry_of(Arc::new(MockConnector::new(
        DataSource::Manual,
    ))));
    let old = daily_points("BTC", day(2000, 1, 1), day(2000, 1, 3), 1.into(), DataSource::Manual);
    store.save_historical_prices(&old).await.unwrap();

    assert_eq!(svc.cleanup_old_data(30).await.unwrap(), 3);
    assert_eq!(svc.cleanup_old_data(30).await.unwrap(), 0);
}

#[test]
fn builder_requires_a_registry() {
    let err = DataService::builder().build().unwrap_err();
    assert!(matches!(err, CambioError::InvalidArg(_)));
}

#[tokio::test]
async fn client_stats_follow_registry_order() {
    let registry = ClientRegistry::builder()
        .fallback(Arc::new(MockConnector::new(DataSource::Binance)))
        .primary(Arc::new(MockConnector::new(DataSource::Manual)))
        .build()
        .unwrap();
    let (svc, _) = service_with_memory(registry);
    let sources: Vec<DataSource> = svc.client_stats().iter().map(|s| s.source).collect();
    assert_eq!(sources, vec![DataSource::Manual, DataSource::Binance]);
}
