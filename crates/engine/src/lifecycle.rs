use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use common::{
    Candle, EngineState, Error, FeedCloser, FeedEvent, KlinePush, MarketFeed, Result, TradeConfig,
};

/// Callback invoked once per confirmed candle.
#[async_trait]
pub trait CandleHandler: Send + Sync {
    /// The return value is logged and has no effect on the lifecycle.
    async fn on_candle(&self, candle: &Candle) -> bool;
}

struct Running {
    closer: FeedCloser,
    reader_stop: oneshot::Sender<()>,
    reader: JoinHandle<()>,
}

/// Owns the feed subscription for one instrument and turns its push stream
/// into confirmed-candle callbacks.
///
/// The run-state lock is the only thing shared with the reader task. The
/// reader holds a read guard for the whole callback, so `stop` (which takes
/// the write guard) cannot return while a callback is in flight, and no
/// callback starts after it does.
pub struct CandleLifecycle {
    feed: Arc<dyn MarketFeed>,
    handler: Arc<dyn CandleHandler>,
    trade_config: Arc<TradeConfig>,
    state: Arc<RwLock<EngineState>>,
    /// Serializes `start` and `stop`.
    running: Mutex<Option<Running>>,
}

impl CandleLifecycle {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        handler: Arc<dyn CandleHandler>,
        trade_config: Arc<TradeConfig>,
    ) -> Self {
        Self {
            feed,
            handler,
            trade_config,
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            running: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    pub fn trade_config(&self) -> &TradeConfig {
        &self.trade_config
    }

    /// Subscribe and begin delivering confirmed candles.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        {
            let mut state = self.state.write().await;
            if *state == EngineState::Running {
                return Err(Error::Lifecycle(format!(
                    "already running for {}",
                    self.trade_config.symbol
                )));
            }
            *state = EngineState::Running;
        }

        let tc = &self.trade_config;
        let subscription = match self.feed.subscribe(&tc.symbol, tc.interval).await {
            Ok(subscription) => subscription,
            Err(e) => {
                *self.state.write().await = EngineState::Stopped;
                warn!(symbol = %tc.symbol, error = %e, "Subscription failed, lifecycle stopped");
                return Err(e);
            }
        };

        let (events, closer) = subscription.split();
        let (reader_stop, stop_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(
            events,
            stop_rx,
            self.state.clone(),
            self.handler.clone(),
        ));
        *running = Some(Running {
            closer,
            reader_stop,
            reader,
        });

        info!(symbol = %tc.symbol, interval = %tc.interval, "Lifecycle started");
        Ok(())
    }

    /// Stop delivery, then close the feed and join the reader.
    ///
    /// Queuing for the write guard is what flips delivery off: once a writer
    /// waits, the reader cannot take a new read guard, so no callback starts
    /// after this point. The guard is granted when the in-flight callback (if
    /// any) returns, and the state is set to `Stopped` under it.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        {
            let mut state = self.state.write().await;
            if *state == EngineState::Stopped {
                info!(symbol = %self.trade_config.symbol, "Lifecycle already stopped");
                return;
            }
            *state = EngineState::Stopped;
        }

        if let Some(Running {
            closer,
            reader_stop,
            reader,
        }) = running.take()
        {
            closer.close().await;
            let _ = reader_stop.send(());
            if let Err(e) = reader.await {
                warn!(error = %e, "Candle reader task failed");
            }
        }
        info!(symbol = %self.trade_config.symbol, "Lifecycle stopped");
    }
}

async fn read_events(
    mut events: mpsc::Receiver<FeedEvent>,
    mut stop: oneshot::Receiver<()>,
    state: Arc<RwLock<EngineState>>,
    handler: Arc<dyn CandleHandler>,
) {
    loop {
        let event = tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let text = match event {
            FeedEvent::Message(text) => text,
            FeedEvent::Closed(reason) => {
                warn!(reason = %reason, "Feed connection closed");
                continue;
            }
        };

        let Some(candle) = parse_candle(&text) else {
            continue;
        };
        if !candle.confirmed {
            continue;
        }

        let guard = state.read().await;
        if *guard != EngineState::Running {
            continue;
        }
        let result = handler.on_candle(&candle).await;
        drop(guard);
        debug!(symbol = %candle.symbol, result, "Candle handled");
    }
    debug!("Candle reader exited");
}

/// Candle from the first bar of a kline message. Other topics and
/// unparseable payloads yield `None`.
fn parse_candle(text: &str) -> Option<Candle> {
    let push = match KlinePush::parse(text) {
        Ok(Some(push)) => push,
        Ok(None) => {
            debug!(message = %text, "Ignoring non-kline message");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Unparseable feed message");
            return None;
        }
    };
    match push.first_candle() {
        Ok(candle) => candle,
        Err(e) => {
            warn!(topic = %push.topic, error = %e, "Unparseable kline payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_candle_takes_first_bar() {
        let text = r#"{"topic":"kline.1.BTCUSDT","type":"snapshot","ts":1,
            "data":[{"start":0,"end":59999,"interval":"1","open":"1","close":"2","high":"2",
            "low":"1","volume":"3","turnover":"4","confirm":true,"timestamp":1},
            {"start":60000,"end":119999,"interval":"1","open":"2","close":"3","high":"3",
            "low":"2","volume":"3","turnover":"4","confirm":false,"timestamp":2}]}"#;
        let candle = parse_candle(text).unwrap();
        assert_eq!(candle.close, 2.0);
        assert!(candle.confirmed);
    }

    #[test]
    fn acks_and_garbage_are_skipped() {
        assert!(parse_candle(r#"{"op":"pong","success":true}"#).is_none());
        assert!(parse_candle("not json").is_none());
        assert!(parse_candle(r#"{"topic":"kline.1.BTCUSDT","data":[]}"#).is_none());
    }
}
