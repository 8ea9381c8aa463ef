use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{Bar, Interval, OrderAck, OrderRequest, Position, Result, TradeConfig};

/// Request/response side of the exchange connection.
///
/// `BybitClient` implements this for live trading, `PaperClient` for
/// simulation. Order flow goes through `risk::OrderManager`, which is the only
/// caller of `place_order`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Reference price used for protective levels.
    async fn mark_price(&self, config: &TradeConfig) -> Result<f64>;

    /// Open positions for the configured symbol.
    async fn open_positions(&self, config: &TradeConfig) -> Result<Vec<Position>>;

    async fn place_order(&self, config: &TradeConfig, order: &OrderRequest) -> Result<OrderAck>;

    /// Up to `limit` closed bars, oldest first. The bar still in progress is
    /// never included.
    async fn historical_bars(&self, config: &TradeConfig, limit: usize) -> Result<Vec<Bar>>;

    async fn set_leverage(&self, _config: &TradeConfig, _leverage: u32) -> Result<()> {
        Ok(())
    }
}

/// Message delivered by a market feed subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Raw text frame from the push stream.
    Message(String),
    /// The transport dropped. The feed may reconnect and keep sending.
    Closed(String),
}

/// Push side of the exchange connection.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Subscribe to bar updates for one symbol. The subscription is live when
    /// this returns.
    async fn subscribe(&self, symbol: &str, interval: Interval) -> Result<FeedSubscription>;
}

/// An active feed subscription: the event receiver plus the means to close it.
pub struct FeedSubscription {
    events: mpsc::Receiver<FeedEvent>,
    closer: FeedCloser,
}

impl FeedSubscription {
    /// `shutdown` is fired on close. `task`, if any, is the feed's connection
    /// task and is awaited after the shutdown signal.
    pub fn new(
        events: mpsc::Receiver<FeedEvent>,
        shutdown: oneshot::Sender<()>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            events,
            closer: FeedCloser {
                shutdown: Some(shutdown),
                task,
            },
        }
    }

    pub fn split(self) -> (mpsc::Receiver<FeedEvent>, FeedCloser) {
        (self.events, self.closer)
    }
}

pub struct FeedCloser {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedCloser {
    /// Signal the feed to unsubscribe and wait for its connection task.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
