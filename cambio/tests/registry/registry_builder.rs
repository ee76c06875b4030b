use std::sync::Arc;

use cambio::{CambioError, ClientRegistry, DataSource};
use cambio_mock::{DynamicMockConnector, MockConnector};

#[test]
fn empty_registry_is_rejected() {
    let err = ClientRegistry::builder().build().unwrap_err();
    assert!(matches!(err, CambioError::InvalidArg(_)));
}

#[test]
fn second_primary_is_rejected() {
    let (a, _) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (b, _) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    let err = ClientRegistry::builder()
        .primary(a)
        .primary(b)
        .build()
        .unwrap_err();
    assert!(matches!(err, CambioError::InvalidArg(msg) if msg.contains("primary")));
}

#[test]
fn duplicate_source_is_rejected() {
    let err = ClientRegistry::builder()
        .primary(Arc::new(MockConnector::new(DataSource::Binance)))
        .fallback(Arc::new(MockConnector::new(DataSource::Binance)))
        .build()
        .unwrap_err();
    assert!(matches!(err, CambioError::InvalidArg(msg) if msg.contains("binance")));
}

#[test]
fn primary_is_ordered_first_regardless_of_registration_order() {
    let registry = ClientRegistry::builder()
        .register(Arc::new(MockConnector::new(DataSource::Binance)), false)
        .register(Arc::new(MockConnector::new(DataSource::Manual)), false)
        .register(Arc::new(MockConnector::new(DataSource::CoinGecko)), true)
        .build()
        .unwrap();

    assert_eq!(registry.primary().source(), DataSource::CoinGecko);
    assert_eq!(
        registry.sources(),
        vec![DataSource::CoinGecko, DataSource::Binance, DataSource::Manual]
    );
    let stats: Vec<DataSource> = registry.stats().iter().map(|s| s.source).collect();
    assert_eq!(stats, registry.sources());
}

#[test]
fn first_registered_acts_as_primary_when_none_flagged() {
    let registry = ClientRegistry::builder()
        .fallback(Arc::new(MockConnector::new(DataSource::Manual)))
        .fallback(Arc::new(MockConnector::new(DataSource::Binance)))
        .build()
        .unwrap();
    assert_eq!(registry.primary().source(), DataSource::Manual);
    assert!(registry.get(DataSource::Binance).is_some());
    assert!(registry.get(DataSource::CoinGecko).is_none());
}
