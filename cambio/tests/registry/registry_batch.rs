use std::sync::Arc;

use cambio::{CambioError, Capability, ClientRegistry, DataSource};
use cambio_mock::{DynamicMockConnector, MockBehavior, MockConnector};
use rust_decimal_macros::dec;

use crate::helpers::quote;

fn syms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn batch_source_gets_one_call_with_deduped_symbols() {
    let (cg, ctl) = DynamicMockConnector::with_capabilities(
        DataSource::CoinGecko,
        &[Capability::CurrentPrice, Capability::MultiplePrices],
    );
    for (s, p) in [("BTC", dec!(1)), ("ETH", dec!(2))] {
        ctl.set_price_behavior(s, MockBehavior::Return(Some(quote(s, p, DataSource::CoinGecko))))
            .await;
    }
    let registry = ClientRegistry::builder().primary(cg).build().unwrap();

    let got = registry
        .multiple_prices(&syms(&["btc", "ETH", "BTC"]), "usd")
        .await;
    assert_eq!(got.len(), 2);
    assert_eq!(
        ctl.batch_requests().await,
        vec![vec!["BTC".to_string(), "ETH".to_string()]]
    );
    assert_eq!(ctl.calls(Capability::CurrentPrice).await, 0);
}

#[tokio::test]
async fn unresolved_symbols_move_on_to_the_next_source() {
    let (cg, cg_ctl) = DynamicMockConnector::with_capabilities(
        DataSource::CoinGecko,
        &[Capability::MultiplePrices],
    );
    let (bn, bn_ctl) = DynamicMockConnector::new_with_controller(DataSource::Binance);
    cg_ctl
        .set_price_behavior(
            "BTC",
            MockBehavior::Return(Some(quote("BTC", dec!(1), DataSource::CoinGecko))),
        )
        .await;
    bn_ctl
        .set_price_behavior(
            "SOL",
            MockBehavior::Return(Some(quote("SOL", dec!(3), DataSource::Binance))),
        )
        .await;

    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(bn)
        .build()
        .unwrap();

    let mut got: Vec<(String, DataSource)> = registry
        .multiple_prices(&syms(&["BTC", "SOL", "DOGE"]), "usd")
        .await
        .into_iter()
        .map(|q| (q.symbol().to_string(), q.source()))
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec![
            ("BTC".to_string(), DataSource::CoinGecko),
            ("SOL".to_string(), DataSource::Binance),
        ]
    );
    // BTC was already resolved, so the fallback only saw the rest.
    let mut asked: Vec<String> = bn_ctl
        .price_requests()
        .await
        .into_iter()
        .map(|(s, _)| s)
        .collect();
    asked.sort();
    assert_eq!(asked, vec!["DOGE".to_string(), "SOL".to_string()]);
}

#[tokio::test]
async fn failed_batch_falls_back_and_never_errors() {
    let (cg, cg_ctl) = DynamicMockConnector::with_capabilities(
        DataSource::CoinGecko,
        &[Capability::MultiplePrices],
    );
    cg_ctl
        .set_price_behavior(
            "ETH",
            MockBehavior::Fail(CambioError::transient("coingecko", "429")),
        )
        .await;
    let registry = ClientRegistry::builder()
        .primary(cg)
        .fallback(Arc::new(MockConnector::new(DataSource::Manual)))
        .build()
        .unwrap();

    let got = registry.multiple_prices(&syms(&["ETH", "ADA"]), "usd").await;
    assert_eq!(got.len(), 2);
    assert!(got.iter().all(|q| q.source() == DataSource::Manual));
}

#[tokio::test]
async fn nothing_resolvable_is_an_empty_list() {
    let registry = ClientRegistry::builder()
        .primary(Arc::new(MockConnector::new(DataSource::Manual)))
        .build()
        .unwrap();
    let got = registry
        .multiple_prices(&syms(&["DOGE", "PEPE"]), "usd")
        .await;
    assert!(got.is_empty());
    assert!(registry.multiple_prices(&[], "usd").await.is_empty());
}
