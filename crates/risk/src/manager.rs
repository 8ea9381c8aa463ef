use std::sync::Arc;

use tracing::{debug, info, warn};

use common::{
    Error, ExchangeClient, OrderRequest, Position, ProtectiveLevels, ReconcilePolicy, Result,
    RiskParameters, Side, TradeConfig, MAX_PRICE_PRECISION,
};

/// Round half away from zero to `precision` decimal digits, capped at
/// `MAX_PRICE_PRECISION`.
pub fn round_price(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision.min(MAX_PRICE_PRECISION) as i32);
    (value * scale).round() / scale
}

/// Take-profit and stop-loss for an entry at `mark`. `None` for NEUTRAL.
pub fn protective_levels(
    mark: f64,
    side: Side,
    params: &RiskParameters,
) -> Option<ProtectiveLevels> {
    let (take_profit, stop_loss) = match side {
        Side::Buy => (
            mark * (1.0 + params.take_profit),
            mark * (1.0 - params.stop_loss),
        ),
        Side::Sell => (
            mark * (1.0 - params.take_profit),
            mark * (1.0 + params.stop_loss),
        ),
        Side::Neutral => return None,
    };
    Some(ProtectiveLevels {
        take_profit: round_price(take_profit, params.price_precision),
        stop_loss: round_price(stop_loss, params.price_precision),
    })
}

/// Turns a side into exchange actions: protective levels, position
/// reconciliation and the entry order.
///
/// This is the only caller of `ExchangeClient::place_order`. Exchange failures
/// are logged and reported as `false`; they never reach the lifecycle.
pub struct OrderManager {
    client: Arc<dyn ExchangeClient>,
    params: RiskParameters,
    policy: ReconcilePolicy,
}

impl OrderManager {
    pub fn new(client: Arc<dyn ExchangeClient>, params: RiskParameters) -> Self {
        Self {
            client,
            params,
            policy: ReconcilePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn params(&self) -> &RiskParameters {
        &self.params
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    pub fn calculate_levels(&self, mark: f64, side: Side) -> Option<ProtectiveLevels> {
        protective_levels(mark, side, &self.params)
    }

    /// Apply the configured leverage once before live execution. Spot markets
    /// have no leverage. A failure is logged and does not block trading.
    pub async fn prepare(&self, config: &TradeConfig) {
        if config.channel == "spot" {
            debug!(symbol = %config.symbol, "Spot market, leverage skipped");
            return;
        }
        match self.client.set_leverage(config, self.params.leverage).await {
            Ok(()) => info!(
                symbol = %config.symbol,
                leverage = self.params.leverage,
                "Leverage applied"
            ),
            Err(e) => warn!(
                symbol = %config.symbol,
                leverage = self.params.leverage,
                error = %e,
                "Could not apply leverage"
            ),
        }
    }

    /// Reconcile open positions and enter `side`. Returns whether the entry
    /// order was accepted.
    pub async fn decide_and_execute(&self, side: Side, config: &TradeConfig) -> bool {
        if side.is_neutral() {
            return false;
        }

        let mark = match self.client.mark_price(config).await {
            Ok(mark) => mark,
            Err(e) => {
                warn!(
                    symbol = %config.symbol,
                    side = %side,
                    error = %e,
                    "Mark price unavailable, order skipped"
                );
                return false;
            }
        };
        let Some(levels) = self.calculate_levels(mark, side) else {
            return false;
        };

        match self.execute(side, config, levels).await {
            Ok(executed) => executed,
            Err(e) => {
                warn!(
                    symbol = %config.symbol,
                    side = %side,
                    mark = mark,
                    take_profit = levels.take_profit,
                    stop_loss = levels.stop_loss,
                    error = %e,
                    "Order attempt failed"
                );
                false
            }
        }
    }

    async fn execute(
        &self,
        side: Side,
        config: &TradeConfig,
        levels: ProtectiveLevels,
    ) -> Result<bool> {
        self.reconcile(side, config).await?;

        let order = OrderRequest::market(&config.symbol, side, self.params.quantity)
            .with_levels(levels);
        info!(
            symbol = %config.symbol,
            side = %side,
            qty = order.quantity,
            take_profit = levels.take_profit,
            stop_loss = levels.stop_loss,
            "Submitting order"
        );
        let ack = self.client.place_order(config, &order).await?;
        if !ack.is_success() {
            return Err(Error::Exchange(format!(
                "order rejected with code {}",
                ack.code
            )));
        }
        info!(
            symbol = %config.symbol,
            side = %side,
            order_id = %ack.order_id,
            "Order accepted"
        );
        Ok(true)
    }

    /// Close what the policy says must go before entering `target`.
    async fn reconcile(&self, target: Side, config: &TradeConfig) -> Result<()> {
        let positions: Vec<Position> = self
            .client
            .open_positions(config)
            .await?
            .into_iter()
            .filter(Position::is_open)
            .filter(|p| self.policy.should_close(p, target))
            .collect();

        for position in &positions {
            info!(
                symbol = %position.symbol,
                side = %position.side,
                size = position.size,
                "Closing position"
            );
            let ack = self
                .client
                .place_order(config, &OrderRequest::close(position))
                .await?;
            if !ack.is_success() {
                return Err(Error::Exchange(format!(
                    "close of {} {} rejected with code {}",
                    position.side, position.symbol, ack.code
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::{Bar, Interval, OrderAck};

    /// Scripted client recording every call.
    #[derive(Default)]
    struct MockClient {
        mark: Option<f64>,
        positions: Vec<Position>,
        reject_code: i64,
        fail_orders: bool,
        calls: Mutex<Vec<String>>,
        orders: Mutex<Vec<OrderRequest>>,
    }

    impl MockClient {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn orders(&self) -> Vec<OrderRequest> {
            self.orders.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExchangeClient for MockClient {
        async fn mark_price(&self, _config: &TradeConfig) -> Result<f64> {
            self.calls.lock().unwrap().push("mark_price".into());
            self.mark
                .ok_or_else(|| Error::Exchange("ticker unavailable".into()))
        }

        async fn open_positions(&self, _config: &TradeConfig) -> Result<Vec<Position>> {
            self.calls.lock().unwrap().push("open_positions".into());
            Ok(self.positions.clone())
        }

        async fn place_order(
            &self,
            _config: &TradeConfig,
            order: &OrderRequest,
        ) -> Result<OrderAck> {
            self.calls.lock().unwrap().push("place_order".into());
            self.orders.lock().unwrap().push(order.clone());
            if self.fail_orders {
                return Err(Error::Exchange("timeout".into()));
            }
            Ok(OrderAck {
                code: self.reject_code,
                order_id: "1".into(),
                timestamp: chrono::Utc::now(),
            })
        }

        async fn historical_bars(&self, _config: &TradeConfig, _limit: usize) -> Result<Vec<Bar>> {
            Ok(Vec::new())
        }

        async fn set_leverage(&self, _config: &TradeConfig, _leverage: u32) -> Result<()> {
            self.calls.lock().unwrap().push("set_leverage".into());
            Err(Error::Exchange("leverage rejected".into()))
        }
    }

    fn config() -> TradeConfig {
        TradeConfig::new("BTCUSDT", Interval::Min1, "linear")
    }

    fn position(side: Side, size: f64) -> Position {
        Position {
            symbol: "BTCUSDT".into(),
            side,
            size,
        }
    }

    fn manager(client: Arc<MockClient>) -> OrderManager {
        OrderManager::new(client, RiskParameters::default())
    }

    #[test]
    fn levels_match_side() {
        let params = RiskParameters::default();
        let buy = protective_levels(20_000.0, Side::Buy, &params).unwrap();
        assert_eq!(buy.take_profit, 20_240.0);
        assert_eq!(buy.stop_loss, 19_820.0);

        let sell = protective_levels(20_000.0, Side::Sell, &params).unwrap();
        assert_eq!(sell.take_profit, 19_760.0);
        assert_eq!(sell.stop_loss, 20_180.0);

        assert!(protective_levels(20_000.0, Side::Neutral, &params).is_none());
    }

    #[test]
    fn levels_round_to_precision() {
        let params = RiskParameters {
            price_precision: 1,
            ..RiskParameters::default()
        };
        let levels = protective_levels(123.456, Side::Buy, &params).unwrap();
        assert_eq!(levels.take_profit, 124.9);
        assert_eq!(levels.stop_loss, 122.3);
        assert_eq!(round_price(2.5, 0), 3.0);
        assert_eq!(round_price(-2.5, 0), -3.0);
    }

    #[test]
    fn oversized_precision_never_yields_nan() {
        for precision in [400, u32::MAX] {
            let rounded = round_price(20_123.45, precision);
            assert!(rounded.is_finite());
            assert!((rounded - 20_123.45).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn neutral_makes_no_exchange_calls() {
        let client = Arc::new(MockClient {
            mark: Some(100.0),
            ..MockClient::default()
        });
        assert!(!manager(client.clone()).decide_and_execute(Side::Neutral, &config()).await);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn close_opposite_keeps_same_side_and_skips_flat() {
        let client = Arc::new(MockClient {
            mark: Some(100.0),
            positions: vec![
                position(Side::Sell, 0.5),
                position(Side::Buy, 0.2),
                position(Side::Sell, 0.0),
            ],
            ..MockClient::default()
        });
        assert!(manager(client.clone()).decide_and_execute(Side::Buy, &config()).await);

        let orders = client.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].quantity, 0.5);
        assert!(orders[0].reduce_only);
        assert!(orders[0].take_profit.is_none());

        assert_eq!(orders[1].side, Side::Buy);
        assert_eq!(orders[1].quantity, 0.001);
        assert!(!orders[1].reduce_only);
        assert_eq!(orders[1].take_profit, Some(101.2));
        assert_eq!(orders[1].stop_loss, Some(99.1));
    }

    #[tokio::test]
    async fn close_all_closes_every_open_position() {
        let client = Arc::new(MockClient {
            mark: Some(100.0),
            positions: vec![position(Side::Buy, 0.2), position(Side::Sell, 0.3)],
            ..MockClient::default()
        });
        let manager = manager(client.clone()).with_policy(ReconcilePolicy::CloseAll);
        assert!(manager.decide_and_execute(Side::Buy, &config()).await);

        let orders = client.orders();
        assert_eq!(orders.len(), 3);
        assert!(orders[..2].iter().all(|o| o.reduce_only));
        assert_eq!(orders[0].side, Side::Sell);
        assert_eq!(orders[1].side, Side::Buy);
    }

    #[tokio::test]
    async fn failed_close_aborts_entry() {
        let client = Arc::new(MockClient {
            mark: Some(100.0),
            positions: vec![position(Side::Sell, 1.0)],
            fail_orders: true,
            ..MockClient::default()
        });
        assert!(!manager(client.clone()).decide_and_execute(Side::Buy, &config()).await);
        assert_eq!(client.orders().len(), 1);
    }

    #[tokio::test]
    async fn rejected_ack_is_not_executed() {
        let client = Arc::new(MockClient {
            mark: Some(100.0),
            reject_code: 10001,
            ..MockClient::default()
        });
        assert!(!manager(client).decide_and_execute(Side::Sell, &config()).await);
    }

    #[tokio::test]
    async fn missing_mark_price_skips_everything_else() {
        let client = Arc::new(MockClient::default());
        assert!(!manager(client.clone()).decide_and_execute(Side::Buy, &config()).await);
        assert_eq!(client.calls(), vec!["mark_price".to_string()]);
    }

    #[tokio::test]
    async fn prepare_tolerates_failure_and_skips_spot() {
        let client = Arc::new(MockClient::default());
        let manager = manager(client.clone());
        manager.prepare(&config()).await;
        manager
            .prepare(&TradeConfig::new("BTCUSDT", Interval::Min1, "spot"))
            .await;
        assert_eq!(client.calls(), vec!["set_leverage".to_string()]);
    }
}
