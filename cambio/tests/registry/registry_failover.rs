use std::time::Duration;

use cambio::{CambioError, Capability, ClientRegistry, DataSource};
use cambio_mock::{DynamicMockConnector, MockBehavior};
use rust_decimal_macros::dec;

use crate::helpers::quote;

#[tokio::test]
async fn primary_answers_without_touching_fallback() {
    let (cg, cg_ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (bn, bn_ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    cg_ctl
        .set_price_behavior(
            "BTC",
            MockBehavior::Return(Some(quote("BTC", dec!(100), DataSource::CoinGecko))),
        )
        .await;
    bn_ctl
        .set_price_behavior(
            "BTC",
            MockBehavior::Return(Some(quote("BTC", dec!(200), DataSource::Binance))),
        )
        .await;

    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .build()
        .unwrap();

    let q = registry.current_price("btc", "usd").await.unwrap();
    assert_eq!(q.source(), DataSource::CoinGecko);
    assert_eq!(q.price(), dec!(100));
    assert_eq!(bn_ctl.calls(Capability::CurrentPrice).await, 0);
}

#[tokio::test]
async fn fallback_serves_when_primary_fails() {
    let (cg, cg_ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (bn, bn_ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    cg_ctl
        .set_price_behavior(
            "BTC",
            MockBehavior::Fail(CambioError::transient("coingecko", "503")),
        )
        .await;
    bn_ctl
        .set_price_behavior(
            "BTC",
            MockBehavior::Return(Some(quote("BTC", dec!(200), DataSource::Binance))),
        )
        .await;

    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .build()
        .unwrap();

    let q = registry.current_price("BTC", "usd").await.unwrap();
    assert_eq!(q.source(), DataSource::Binance);
    assert_eq!(cg_ctl.calls(Capability::CurrentPrice).await, 1);
    assert_eq!(bn_ctl.calls(Capability::CurrentPrice).await, 1);
}

#[tokio::test]
async fn fallback_serves_when_primary_has_no_data() {
    let (cg, _cg_ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (bn, bn_ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    bn_ctl
        .set_price_behavior(
            "SOL",
            MockBehavior::Return(Some(quote("SOL", dec!(150), DataSource::Binance))),
        )
        .await;

    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .build()
        .unwrap();

    let q = registry.current_price("SOL", "usd").await.unwrap();
    assert_eq!(q.source(), DataSource::Binance);
}

#[tokio::test]
async fn every_source_failing_yields_none_and_aggregated_error() {
    let (cg, cg_ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (bn, bn_ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    cg_ctl
        .set_price_behavior("BTC", MockBehavior::Fail(CambioError::Data("bad".into())))
        .await;
    bn_ctl
        .set_price_behavior(
            "BTC",
            MockBehavior::Fail(CambioError::transient("binance", "reset")),
        )
        .await;

    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .build()
        .unwrap();

    assert!(registry.current_price("BTC", "usd").await.is_none());
    match registry.try_current_price("BTC", "usd").await.unwrap_err() {
        CambioError::AllProvidersFailed(errors) => {
            assert_eq!(errors.len(), 2);
            assert!(matches!(
                &errors[0],
                CambioError::Connector { connector, .. } if connector == "coingecko"
            ));
            assert!(matches!(&errors[1], CambioError::Transient { .. }));
        }
        other => panic!("expected AllProvidersFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn no_source_having_data_is_not_found() {
    let (cg, _) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (bn, _) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .build()
        .unwrap();

    let err = registry.try_current_price("DOGE", "usd").await.unwrap_err();
    assert!(matches!(err, CambioError::NotFound { .. }), "got {err:?}");
    assert!(!err.is_actionable());
}

#[tokio::test(start_paused = true)]
async fn hanging_sources_time_out_and_fall_through() {
    let (cg, cg_ctl) = DynamicMockConnector::new_with_controller(DataSource::CoinGecko);
    let (bn, bn_ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    cg_ctl.set_price_behavior("BTC", MockBehavior::Hang).await;
    bn_ctl.set_price_behavior("BTC", MockBehavior::Hang).await;

    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .provider_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = registry.try_current_price("BTC", "usd").await.unwrap_err();
    assert_eq!(
        err,
        CambioError::AllProvidersTimedOut {
            capability: "current-price".into()
        }
    );

    bn_ctl
        .set_price_behavior(
            "BTC",
            MockBehavior::Return(Some(quote("BTC", dec!(1), DataSource::Binance))),
        )
        .await;
    let q = registry.current_price("BTC", "usd").await.unwrap();
    assert_eq!(q.source(), DataSource::Binance);
}

#[tokio::test]
async fn sources_without_price_capability_are_skipped() {
    let (hist_only, ctl) =
        DynamicMockConnector::with_capabilities(DataSource::CoinGecko, &[Capability::HistoricalPrices]);
    let registry = ClientRegistry::builder().primary(hist_only).build().unwrap();

    let err = registry.try_current_price("BTC", "usd").await.unwrap_err();
    assert!(matches!(err, CambioError::Unsupported { .. }), "got {err:?}");
    assert_eq!(ctl.calls(Capability::CurrentPrice).await, 0);
}
