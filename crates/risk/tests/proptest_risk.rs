use std::sync::Arc;

use proptest::prelude::*;

use common::{
    ExchangeClient, Interval, Position, ReconcilePolicy, RiskParameters, Side, TradeConfig,
};
use paper::PaperClient;
use risk::{protective_levels, OrderManager};

proptest! {
    /// BUY puts TP above and SL below the mark, SELL the reverse.
    #[test]
    fn levels_bracket_the_mark(
        mark in 1.0f64..1_000_000.0f64,
        tp in 0.001f64..0.5f64,
        sl in 0.001f64..0.5f64,
        precision in 0u32..6,
    ) {
        let params = RiskParameters {
            take_profit: tp,
            stop_loss: sl,
            price_precision: precision,
            ..RiskParameters::default()
        };
        let half_tick = 0.5 * 10f64.powi(-(precision as i32));

        let buy = protective_levels(mark, Side::Buy, &params).unwrap();
        prop_assert!(buy.take_profit >= mark - half_tick);
        prop_assert!(buy.stop_loss <= mark + half_tick);
        prop_assert!(buy.take_profit >= buy.stop_loss);

        let sell = protective_levels(mark, Side::Sell, &params).unwrap();
        prop_assert!(sell.stop_loss >= mark - half_tick);
        prop_assert!(sell.take_profit <= mark + half_tick);
        prop_assert!(sell.stop_loss >= sell.take_profit);
    }

    /// Levels never carry more digits than the instrument allows.
    #[test]
    fn levels_are_rounded(mark in 1.0f64..100_000.0f64, precision in 0u32..5) {
        let params = RiskParameters { price_precision: precision, ..RiskParameters::default() };
        let scale = 10f64.powi(precision as i32);
        for side in [Side::Buy, Side::Sell] {
            let levels = protective_levels(mark, side, &params).unwrap();
            for price in [levels.take_profit, levels.stop_loss] {
                let scaled = price * scale;
                prop_assert!((scaled - scaled.round()).abs() < 1e-6 * scaled.abs().max(1.0));
            }
        }
    }
}

fn config() -> TradeConfig {
    TradeConfig::new("BTCUSDT", Interval::Min5, "linear")
}

#[tokio::test]
async fn paper_round_trip_flips_position() {
    let client = Arc::new(PaperClient::new(0.0));
    client.update_price("BTCUSDT", 25_000.0).await;
    let manager = OrderManager::new(client.clone(), RiskParameters::default());
    let cfg = config();

    manager.prepare(&cfg).await;
    assert_eq!(client.leverage("BTCUSDT").await, Some(10));

    assert!(manager.decide_and_execute(Side::Buy, &cfg).await);
    let positions = client.open_positions(&cfg).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, Side::Buy);

    // Same side again adds without closing.
    assert!(manager.decide_and_execute(Side::Buy, &cfg).await);
    assert_eq!(client.fills().await.len(), 2);

    assert!(manager.decide_and_execute(Side::Sell, &cfg).await);
    let positions = client.open_positions(&cfg).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, Side::Sell);
    assert!((positions[0].size - 0.001).abs() < 1e-12);

    let fills = client.fills().await;
    assert_eq!(fills.len(), 4);
    assert!(fills[2].order.reduce_only);
    assert_eq!(fills[3].order.take_profit, Some(24_700.0));
    assert_eq!(fills[3].order.stop_loss, Some(25_225.0));
}

#[tokio::test]
async fn close_all_flattens_before_same_side_entry() {
    let client = Arc::new(PaperClient::new(0.0));
    client.update_price("BTCUSDT", 100.0).await;
    client
        .insert_position(Position {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            size: 0.5,
        })
        .await;
    let manager = OrderManager::new(client.clone(), RiskParameters::default())
        .with_policy(ReconcilePolicy::CloseAll);

    assert!(manager.decide_and_execute(Side::Buy, &config()).await);
    let positions = client.open_positions(&config()).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert!((positions[0].size - 0.001).abs() < 1e-12);
}

#[tokio::test]
async fn paper_without_price_reports_failure() {
    let client = Arc::new(PaperClient::new(0.0));
    let manager = OrderManager::new(client.clone(), RiskParameters::default());
    assert!(!manager.decide_and_execute(Side::Sell, &config()).await);
    assert!(client.fills().await.is_empty());
}
