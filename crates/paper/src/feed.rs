//! In-process market feed. Candles are pushed through a `PaperFeedHandle` as
//! the same kline JSON the live stream delivers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use common::{Candle, FeedEvent, FeedSubscription, Interval, KlinePush, MarketFeed, Result};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct Slot {
    sender: Option<mpsc::Sender<FeedEvent>>,
    interval: Option<Interval>,
    subscriptions: usize,
}

pub struct PaperFeed {
    slot: Arc<Mutex<Slot>>,
}

/// Producer side of a `PaperFeed`.
#[derive(Clone)]
pub struct PaperFeedHandle {
    slot: Arc<Mutex<Slot>>,
}

impl PaperFeed {
    pub fn new() -> (PaperFeed, PaperFeedHandle) {
        let slot = Arc::new(Mutex::new(Slot::default()));
        (
            PaperFeed { slot: slot.clone() },
            PaperFeedHandle { slot },
        )
    }
}

#[async_trait]
impl MarketFeed for PaperFeed {
    async fn subscribe(&self, symbol: &str, interval: Interval) -> Result<FeedSubscription> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        {
            let mut slot = self.slot.lock().await;
            slot.sender = Some(tx);
            slot.interval = Some(interval);
            slot.subscriptions += 1;
        }
        info!(symbol = %symbol, interval = %interval, "Paper feed subscribed");

        let slot = self.slot.clone();
        let task = tokio::spawn(async move {
            let _ = shutdown_rx.await;
            let mut slot = slot.lock().await;
            slot.sender = None;
            slot.interval = None;
            debug!("Paper feed unsubscribed");
        });

        Ok(FeedSubscription::new(rx, shutdown_tx, Some(task)))
    }
}

impl PaperFeedHandle {
    /// Push a candle as a kline message. Returns false when nobody is
    /// subscribed.
    pub async fn push_candle(&self, candle: &Candle) -> bool {
        let interval = {
            let slot = self.slot.lock().await;
            match slot.interval {
                Some(interval) => interval,
                None => return false,
            }
        };
        match serde_json::to_string(&KlinePush::from_candle(candle, interval.as_str())) {
            Ok(text) => self.push_raw(text).await,
            Err(e) => {
                warn!(error = %e, "Could not encode paper candle");
                false
            }
        }
    }

    /// Push an arbitrary text frame.
    pub async fn push_raw(&self, text: impl Into<String>) -> bool {
        self.send(FeedEvent::Message(text.into())).await
    }

    /// Simulate a dropped transport.
    pub async fn disconnect(&self, reason: impl Into<String>) -> bool {
        self.send(FeedEvent::Closed(reason.into())).await
    }

    pub async fn is_subscribed(&self) -> bool {
        self.slot.lock().await.sender.is_some()
    }

    /// Number of `subscribe` calls served so far.
    pub async fn subscriptions(&self) -> usize {
        self.slot.lock().await.subscriptions
    }

    async fn send(&self, event: FeedEvent) -> bool {
        let sender = self.slot.lock().await.sender.clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}
