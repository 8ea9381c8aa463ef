//! Kline push message as delivered by the market feed.
//!
//! ```json
//! {"topic":"kline.1.BTCUSDT","type":"snapshot","ts":1672324988882,
//!  "data":[{"start":1672324800000,"end":1672324859999,"interval":"1",
//!           "open":"16649.5","close":"16677","high":"16677","low":"16608",
//!           "volume":"2.081","turnover":"34666.4005","confirm":false,
//!           "timestamp":1672324988882}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::{Candle, Error, Result};

pub const KLINE_TOPIC_PREFIX: &str = "kline.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KlinePush {
    pub topic: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub ts: i64,
    pub data: Vec<KlineEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KlineEntry {
    pub start: i64,
    pub end: i64,
    pub interval: String,
    pub open: String,
    pub close: String,
    pub high: String,
    pub low: String,
    pub volume: String,
    pub turnover: String,
    pub confirm: bool,
    pub timestamp: i64,
}

impl KlinePush {
    /// Symbol is the last dot-separated segment of the topic.
    pub fn symbol(&self) -> Option<&str> {
        self.topic.rsplit('.').next().filter(|s| !s.is_empty())
    }

    /// Parse a raw text frame. Non-kline messages (acks, pongs) yield `None`.
    pub fn parse(text: &str) -> Result<Option<KlinePush>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let is_kline = value
            .get("topic")
            .and_then(|t| t.as_str())
            .is_some_and(|t| t.starts_with(KLINE_TOPIC_PREFIX));
        if !is_kline {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Candle built from the first bar in the message.
    pub fn first_candle(&self) -> Result<Option<Candle>> {
        let Some(entry) = self.data.first() else {
            return Ok(None);
        };
        let symbol = self
            .symbol()
            .ok_or_else(|| Error::Data(format!("no symbol in topic '{}'", self.topic)))?;
        entry.to_candle(symbol).map(Some)
    }

    pub fn from_candle(candle: &Candle, interval: &str) -> Self {
        Self {
            topic: format!("{KLINE_TOPIC_PREFIX}{interval}.{}", candle.symbol),
            kind: "snapshot".into(),
            ts: candle.timestamp,
            data: vec![KlineEntry {
                start: candle.start,
                end: candle.end,
                interval: interval.to_string(),
                open: candle.open.to_string(),
                close: candle.close.to_string(),
                high: candle.high.to_string(),
                low: candle.low.to_string(),
                volume: candle.volume.to_string(),
                turnover: candle.turnover.to_string(),
                confirm: candle.confirmed,
                timestamp: candle.timestamp,
            }],
        }
    }
}

impl KlineEntry {
    pub fn to_candle(&self, symbol: &str) -> Result<Candle> {
        Ok(Candle {
            symbol: symbol.to_string(),
            open: parse_price("open", &self.open)?,
            high: parse_price("high", &self.high)?,
            low: parse_price("low", &self.low)?,
            close: parse_price("close", &self.close)?,
            volume: parse_price("volume", &self.volume)?,
            turnover: parse_price("turnover", &self.turnover)?,
            start: self.start,
            end: self.end,
            timestamp: self.timestamp,
            confirmed: self.confirm,
        })
    }
}

fn parse_price(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| Error::Data(format!("bad {field} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"topic":"kline.5.BTCUSDT","type":"snapshot","ts":1672324988882,
        "data":[{"start":1672324800000,"end":1672325099999,"interval":"5","open":"16649.5",
        "close":"16677","high":"16677","low":"16608","volume":"2.081","turnover":"34666.4005",
        "confirm":true,"timestamp":1672324988882}]}"#;

    #[test]
    fn parses_kline_push() {
        let push = KlinePush::parse(SAMPLE).unwrap().unwrap();
        assert_eq!(push.symbol(), Some("BTCUSDT"));
        let candle = push.first_candle().unwrap().unwrap();
        assert_eq!(candle.symbol, "BTCUSDT");
        assert_eq!(candle.close, 16677.0);
        assert_eq!(candle.turnover, 34666.4005);
        assert!(candle.confirmed);
    }

    #[test]
    fn non_kline_messages_are_skipped() {
        let ack = r#"{"success":true,"ret_msg":"","conn_id":"abc","op":"subscribe"}"#;
        assert!(KlinePush::parse(ack).unwrap().is_none());
    }

    #[test]
    fn bad_price_is_a_data_error() {
        let text = SAMPLE.replace("\"16649.5\"", "\"n/a\"");
        let push = KlinePush::parse(&text).unwrap().unwrap();
        assert!(matches!(push.first_candle(), Err(Error::Data(_))));
    }

    #[test]
    fn candle_round_trips_through_push() {
        let push = KlinePush::parse(SAMPLE).unwrap().unwrap();
        let candle = push.first_candle().unwrap().unwrap();
        let text = serde_json::to_string(&KlinePush::from_candle(&candle, "5")).unwrap();
        let again = KlinePush::parse(&text).unwrap().unwrap();
        assert_eq!(again.first_candle().unwrap().unwrap(), candle);
    }
}
