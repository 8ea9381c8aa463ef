use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use common::{Candle, ExchangeClient, Frame, Result, RiskParameters};
use risk::OrderManager;
use strategy::Strategy;

use crate::lifecycle::CandleHandler;

/// Per-candle stage: refresh history, run the strategy, and hand any trade
/// decision to the order manager.
pub struct Trader {
    strategy: Arc<dyn Strategy>,
    client: Arc<dyn ExchangeClient>,
    orders: OrderManager,
}

impl Trader {
    pub fn new(
        strategy: Arc<dyn Strategy>,
        client: Arc<dyn ExchangeClient>,
        params: RiskParameters,
    ) -> Self {
        let orders =
            OrderManager::new(client.clone(), params).with_policy(strategy.reconcile_policy());
        Self {
            strategy,
            client,
            orders,
        }
    }

    pub fn strategy(&self) -> &Arc<dyn Strategy> {
        &self.strategy
    }

    /// One-off exchange setup before the first candle.
    pub async fn prepare(&self) {
        self.orders.prepare(self.strategy.trade_config()).await;
    }

    /// Returns whether an order was executed.
    pub async fn stage(&self) -> Result<bool> {
        let tc = self.strategy.trade_config();
        let bars = self
            .client
            .historical_bars(tc, self.strategy.fetch_window())
            .await?;
        let frame = self.strategy.compute(&Frame::from_bars(&bars))?;
        let decision = self.strategy.decide(&frame);
        info!(
            strategy = %self.strategy.name(),
            symbol = %tc.symbol,
            bars = frame.len(),
            trade = decision.trade,
            "{}",
            decision.summary
        );

        if !decision.trade {
            return Ok(false);
        }
        Ok(self.orders.decide_and_execute(decision.side, tc).await)
    }
}

#[async_trait]
impl CandleHandler for Trader {
    async fn on_candle(&self, candle: &Candle) -> bool {
        info!(candle = %candle, "Confirmed candle");
        match self.stage().await {
            Ok(executed) => executed,
            Err(e) => {
                warn!(
                    strategy = %self.strategy.name(),
                    symbol = %candle.symbol,
                    error = %e,
                    "Stage failed"
                );
                false
            }
        }
    }
}
