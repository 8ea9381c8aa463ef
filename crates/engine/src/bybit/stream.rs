use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use common::{Error, FeedEvent, FeedSubscription, Interval, MarketFeed, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT: Duration = Duration::from_secs(20);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 256;

/// Bybit v5 public kline stream.
///
/// Each subscription owns one connection task. Dropped connections are
/// reported as `FeedEvent::Closed` and re-established with exponential
/// backoff until the subscription is closed.
pub struct BybitFeed {
    ws_url: String,
    channel: String,
}

impl BybitFeed {
    pub fn new(ws_url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            channel: channel.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v5/public/{}", self.ws_url, self.channel)
    }
}

pub fn kline_topic(symbol: &str, interval: Interval) -> String {
    format!("kline.{}.{symbol}", interval.as_str())
}

#[async_trait]
impl MarketFeed for BybitFeed {
    async fn subscribe(&self, symbol: &str, interval: Interval) -> Result<FeedSubscription> {
        let endpoint = self.endpoint();
        let topic = kline_topic(symbol, interval);

        // First connection happens here so a bad endpoint fails the caller.
        let socket = connect(&endpoint, &topic).await?;
        info!(topic = %topic, endpoint = %endpoint, "Subscribed to Bybit kline stream");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(endpoint, topic, socket, tx, shutdown_rx));
        Ok(FeedSubscription::new(rx, shutdown_tx, Some(task)))
    }
}

async fn connect(endpoint: &str, topic: &str) -> Result<WsStream> {
    let url = Url::parse(endpoint).map_err(|e| Error::WebSocket(e.to_string()))?;
    let (mut socket, _) = connect_async(url)
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;
    send_op(&mut socket, "subscribe", Some(topic)).await?;
    Ok(socket)
}

async fn send_op(socket: &mut WsStream, op: &str, topic: Option<&str>) -> Result<()> {
    let payload = match topic {
        Some(topic) => json!({ "op": op, "args": [topic] }),
        None => json!({ "op": op }),
    };
    socket
        .send(Message::Text(payload.to_string()))
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))
}

enum Exit {
    Shutdown,
    Dropped(String),
}

/// Connection task: pump frames until shutdown, reconnecting on failure.
async fn run(
    endpoint: String,
    topic: String,
    socket: WsStream,
    tx: mpsc::Sender<FeedEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut socket = Some(socket);
    let mut backoff = Duration::from_secs(1);

    loop {
        let current = match socket.take() {
            Some(s) => s,
            None => {
                let attempt = tokio::select! {
                    _ = &mut shutdown => return,
                    attempt = connect(&endpoint, &topic) => attempt,
                };
                match attempt {
                    Ok(s) => {
                        info!(topic = %topic, "Bybit kline stream reconnected");
                        backoff = Duration::from_secs(1);
                        s
                    }
                    Err(e) => {
                        warn!(topic = %topic, error = %e, backoff = ?backoff, "Reconnect failed");
                        tokio::select! {
                            _ = &mut shutdown => return,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                }
            }
        };

        match pump(current, &topic, &tx, &mut shutdown).await {
            Exit::Shutdown => return,
            Exit::Dropped(reason) => {
                warn!(topic = %topic, reason = %reason, "Bybit kline stream dropped");
                if tx.send(FeedEvent::Closed(reason)).await.is_err() {
                    return;
                }
                tokio::select! {
                    _ = &mut shutdown => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn pump(
    mut socket: WsStream,
    topic: &str,
    tx: &mpsc::Sender<FeedEvent>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Exit {
    let mut heartbeat = interval(HEARTBEAT);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                let _ = send_op(&mut socket, "unsubscribe", Some(topic)).await;
                let _ = socket.close(None).await;
                debug!(topic = %topic, "Bybit kline stream closed");
                return Exit::Shutdown;
            }
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(FeedEvent::Message(text)).await.is_err() {
                            let _ = socket.close(None).await;
                            return Exit::Shutdown;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = socket.send(Message::Pong(payload)).await {
                            return Exit::Dropped(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Exit::Dropped(format!("closed by server: {frame:?}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Dropped(e.to_string()),
                    None => return Exit::Dropped("stream ended".into()),
                }
            }
            _ = heartbeat.tick() => {
                if let Err(e) = send_op(&mut socket, "ping", None).await {
                    return Exit::Dropped(e.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_and_topic_follow_v5_layout() {
        let feed = BybitFeed::new("wss://stream.bybit.com/", "linear");
        assert_eq!(feed.endpoint(), "wss://stream.bybit.com/v5/public/linear");
        assert_eq!(kline_topic("BTCUSDT", Interval::Hour1), "kline.60.BTCUSDT");
        assert_eq!(kline_topic("ETHUSDT", Interval::Day1), "kline.D.ETHUSDT");
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_subscribe() {
        let feed = BybitFeed::new("ws://127.0.0.1:9", "linear");
        assert!(matches!(
            feed.subscribe("BTCUSDT", Interval::Min1).await,
            Err(Error::WebSocket(_))
        ));
    }
}
