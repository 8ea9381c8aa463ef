pub mod feed;

pub use feed::{PaperFeed, PaperFeedHandle};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Bar, Error, ExchangeClient, OrderAck, OrderRequest, Position, Result, Side, TradeConfig,
};

/// A simulated fill, kept in the client's order log.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub order: OrderRequest,
    pub fill_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Simulated exchange client for paper trading.
///
/// Fills are simulated at the mark price with configurable slippage against a
/// net position per symbol. No real orders are ever sent to the exchange.
/// Prices and bars come from local overrides first, then from the optional
/// upstream market-data client.
pub struct PaperClient {
    /// Net open position per symbol.
    positions: Arc<RwLock<HashMap<String, Position>>>,
    /// Mark price overrides per symbol, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Closed bars per symbol, oldest first.
    bars: Arc<RwLock<HashMap<String, Vec<Bar>>>>,
    fills: Arc<RwLock<Vec<PaperFill>>>,
    leverage: Arc<RwLock<HashMap<String, u32>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    market_data: Option<Arc<dyn ExchangeClient>>,
}

impl PaperClient {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps = slippage_bps, "PaperClient initialized");
        Self {
            positions: Arc::new(RwLock::new(HashMap::new())),
            prices: Arc::new(RwLock::new(HashMap::new())),
            bars: Arc::new(RwLock::new(HashMap::new())),
            fills: Arc::new(RwLock::new(Vec::new())),
            leverage: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
            market_data: None,
        }
    }

    /// Read prices and history from `client` when no local override exists.
    /// Orders still never leave the process.
    pub fn with_market_data(mut self, client: Arc<dyn ExchangeClient>) -> Self {
        self.market_data = Some(client);
        self
    }

    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Replace the stored history for `symbol`.
    pub async fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        if let Some(last) = bars.last() {
            self.update_price(symbol, last.close).await;
        }
        self.bars.write().await.insert(symbol.to_string(), bars);
    }

    /// Append one closed bar and move the mark price to its close.
    pub async fn push_bar(&self, symbol: &str, bar: Bar) {
        self.update_price(symbol, bar.close).await;
        self.bars
            .write()
            .await
            .entry(symbol.to_string())
            .or_default()
            .push(bar);
    }

    /// Seed an open position, replacing any existing one for its symbol.
    pub async fn insert_position(&self, position: Position) {
        self.positions
            .write()
            .await
            .insert(position.symbol.clone(), position);
    }

    pub async fn fills(&self) -> Vec<PaperFill> {
        self.fills.read().await.clone()
    }

    pub async fn leverage(&self, symbol: &str) -> Option<u32> {
        self.leverage.read().await.get(symbol).copied()
    }

    fn fill_price(&self, mark: f64, side: Side) -> f64 {
        // Buys pay more, sells receive less
        match side {
            Side::Buy => mark * (1.0 + self.slippage_bps / 10_000.0),
            Side::Sell => mark * (1.0 - self.slippage_bps / 10_000.0),
            Side::Neutral => mark,
        }
    }
}

/// Net `order` into `existing`. Reduce-only orders never open or flip.
fn net_position(existing: Option<Position>, order: &OrderRequest) -> Option<Position> {
    let Some(mut position) = existing.filter(Position::is_open) else {
        if order.reduce_only {
            return None;
        }
        return Some(Position {
            symbol: order.symbol.clone(),
            side: order.side,
            size: order.quantity,
        });
    };

    if position.side == order.side {
        if !order.reduce_only {
            position.size += order.quantity;
        }
        return Some(position);
    }

    let remaining = position.size - order.quantity;
    if remaining > f64::EPSILON {
        position.size = remaining;
        Some(position)
    } else if remaining < -f64::EPSILON && !order.reduce_only {
        Some(Position {
            symbol: order.symbol.clone(),
            side: order.side,
            size: -remaining,
        })
    } else {
        None
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn mark_price(&self, config: &TradeConfig) -> Result<f64> {
        if let Some(price) = self.prices.read().await.get(&config.symbol).copied() {
            return Ok(price);
        }
        match &self.market_data {
            Some(upstream) => upstream.mark_price(config).await,
            None => Err(Error::Exchange(format!(
                "PaperClient has no price for '{}'",
                config.symbol
            ))),
        }
    }

    async fn open_positions(&self, config: &TradeConfig) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .read()
            .await
            .get(&config.symbol)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn place_order(&self, config: &TradeConfig, order: &OrderRequest) -> Result<OrderAck> {
        if order.side.is_neutral() {
            return Err(Error::Exchange("cannot place an order without a side".into()));
        }
        if !(order.quantity.is_finite() && order.quantity > 0.0) {
            return Err(Error::Exchange(format!(
                "invalid order quantity {}",
                order.quantity
            )));
        }

        let mark = self.mark_price(config).await?;
        let fill_price = self.fill_price(mark, order.side);
        let order_id = format!("paper-{}", uuid::Uuid::new_v4());
        let timestamp = Utc::now();

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mark = mark,
            fill = fill_price,
            qty = order.quantity,
            reduce_only = order.reduce_only,
            "Paper fill simulated"
        );

        {
            let mut positions = self.positions.write().await;
            let existing = positions.remove(&order.symbol);
            if let Some(updated) = net_position(existing, order) {
                positions.insert(order.symbol.clone(), updated);
            }
        }

        self.fills.write().await.push(PaperFill {
            order_id: order_id.clone(),
            order: order.clone(),
            fill_price,
            timestamp,
        });

        Ok(OrderAck {
            code: 0,
            order_id,
            timestamp,
        })
    }

    async fn historical_bars(&self, config: &TradeConfig, limit: usize) -> Result<Vec<Bar>> {
        if let Some(bars) = self.bars.read().await.get(&config.symbol) {
            let start = bars.len().saturating_sub(limit);
            return Ok(bars[start..].to_vec());
        }
        match &self.market_data {
            Some(upstream) => upstream.historical_bars(config, limit).await,
            None => Err(Error::Exchange(format!(
                "PaperClient has no history for '{}'",
                config.symbol
            ))),
        }
    }

    async fn set_leverage(&self, config: &TradeConfig, leverage: u32) -> Result<()> {
        debug!(symbol = %config.symbol, leverage, "Paper leverage set");
        self.leverage
            .write()
            .await
            .insert(config.symbol.clone(), leverage);
        Ok(())
    }
}
