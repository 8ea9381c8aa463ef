use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Trade direction. The numeric code is the canonical storage form:
/// `Buy = 1`, `Sell = -1`, `Neutral = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
    #[default]
    Neutral,
}

impl Side {
    pub const fn code(self) -> i8 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
            Side::Neutral => 0,
        }
    }

    /// Code as stored in a frame column.
    pub fn signal(self) -> f64 {
        f64::from(self.code())
    }

    /// Inverse of [`Side::signal`]. Anything that is not exactly +1 or -1
    /// (including NaN) maps to `Neutral`.
    pub fn from_signal(value: f64) -> Side {
        if value == 1.0 {
            Side::Buy
        } else if value == -1.0 {
            Side::Sell
        } else {
            Side::Neutral
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
            Side::Neutral => Side::Neutral,
        }
    }

    pub fn is_neutral(self) -> bool {
        self == Side::Neutral
    }

    /// Exchange wire form. `Neutral` has none and is never sent.
    pub fn as_exchange(self) -> Option<&'static str> {
        match self {
            Side::Buy => Some("Buy"),
            Side::Sell => Some("Sell"),
            Side::Neutral => None,
        }
    }

    /// Parse the exchange wire form. Bybit reports an empty side for flat
    /// positions, which maps to `Neutral`.
    pub fn from_exchange(value: &str) -> Side {
        match value {
            "Buy" => Side::Buy,
            "Sell" => Side::Sell,
            _ => Side::Neutral,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
            Side::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Candle timeframe. The string form is the exchange interval code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour2,
    Hour4,
    Hour6,
    Hour12,
    Day1,
    Week1,
    Month1,
}

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::Min1,
        Interval::Min3,
        Interval::Min5,
        Interval::Min15,
        Interval::Min30,
        Interval::Hour1,
        Interval::Hour2,
        Interval::Hour4,
        Interval::Hour6,
        Interval::Hour12,
        Interval::Day1,
        Interval::Week1,
        Interval::Month1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1",
            Interval::Min3 => "3",
            Interval::Min5 => "5",
            Interval::Min15 => "15",
            Interval::Min30 => "30",
            Interval::Hour1 => "60",
            Interval::Hour2 => "120",
            Interval::Hour4 => "240",
            Interval::Hour6 => "360",
            Interval::Hour12 => "720",
            Interval::Day1 => "D",
            Interval::Week1 => "W",
            Interval::Month1 => "M",
        }
    }

    /// Long name, e.g. `MIN_1`, `D_1`.
    pub fn name(&self) -> &'static str {
        match self {
            Interval::Min1 => "MIN_1",
            Interval::Min3 => "MIN_3",
            Interval::Min5 => "MIN_5",
            Interval::Min15 => "MIN_15",
            Interval::Min30 => "MIN_30",
            Interval::Hour1 => "H_1",
            Interval::Hour2 => "H_2",
            Interval::Hour4 => "H_4",
            Interval::Hour6 => "H_6",
            Interval::Hour12 => "H_12",
            Interval::Day1 => "D_1",
            Interval::Week1 => "W_1",
            Interval::Month1 => "MN_1",
        }
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == value || i.name() == value)
            .ok_or_else(|| Error::Config(format!("unsupported interval '{value}'")))
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is being traded. Built once per run and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeConfig {
    pub symbol: String,
    pub interval: Interval,
    /// Exchange category, e.g. `linear`, `inverse`, `spot`.
    pub channel: String,
}

impl TradeConfig {
    pub fn new(symbol: impl Into<String>, interval: Interval, channel: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            channel: channel.into(),
        }
    }
}

impl std::fmt::Display for TradeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} interval={} channel={}",
            self.symbol, self.interval, self.channel
        )
    }
}

/// One bar pushed by the live feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    pub start: i64,
    pub end: i64,
    pub timestamp: i64,
    /// True once the bar's interval has fully elapsed.
    pub confirmed: bool,
}

impl std::fmt::Display for Candle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Open: {} High: {} Low: {} Close: {} Volume: {}",
            self.symbol, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

/// One closed historical bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar start, epoch milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
}

/// An open exchange position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
}

impl Position {
    /// Zero-size entries are reported by some venues for flat symbols.
    pub fn is_open(&self) -> bool {
        self.size > 0.0 && !self.side.is_neutral()
    }
}

/// Execution style. Entries and closes are both sent at market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_exchange(&self) -> &'static str {
        match self {
            OrderType::Market => "Market",
        }
    }
}

/// Take-profit and stop-loss prices attached to an entry order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtectiveLevels {
    pub take_profit: f64,
    pub stop_loss: f64,
}

/// An order to be submitted to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-side id, sent as the order link id.
    pub link_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            link_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            take_profit: None,
            stop_loss: None,
            reduce_only: false,
        }
    }

    /// Market order that flattens `position`.
    pub fn close(position: &Position) -> Self {
        Self {
            reduce_only: true,
            ..Self::market(&position.symbol, position.side.opposite(), position.size)
        }
    }

    pub fn with_levels(mut self, levels: ProtectiveLevels) -> Self {
        self.take_profit = Some(levels.take_profit);
        self.stop_loss = Some(levels.stop_loss);
        self
    }
}

/// Exchange acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange status code. 0 is success.
    pub code: i64,
    pub order_id: String,
    pub timestamp: DateTime<Utc>,
}

impl OrderAck {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Most decimal digits a protective price can be rounded to. Beyond this the
/// f64 scale factor loses integer precision.
pub const MAX_PRICE_PRECISION: u32 = 15;

/// Position sizing and protective offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParameters {
    /// Order quantity in base asset units.
    pub quantity: f64,
    /// Take-profit offset as a fraction of mark price (0.012 = 1.2%).
    pub take_profit: f64,
    /// Stop-loss offset as a fraction of mark price.
    pub stop_loss: f64,
    pub leverage: u32,
    /// Decimal digits protective prices are rounded to.
    pub price_precision: u32,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            quantity: 0.001,
            take_profit: 0.012,
            stop_loss: 0.009,
            leverage: 10,
            price_precision: 2,
        }
    }
}

impl RiskParameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.quantity.is_finite() && self.quantity > 0.0) {
            return Err(Error::construction(
                "quantity",
                format!("must be positive, got {}", self.quantity),
            ));
        }
        for (parameter, value) in [
            ("take_profit", self.take_profit),
            ("stop_loss", self.stop_loss),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(Error::construction(
                    parameter,
                    format!("must be a fraction in [0, 1), got {value}"),
                ));
            }
        }
        if self.leverage < 1 {
            return Err(Error::construction("leverage", "must be at least 1"));
        }
        if self.price_precision > MAX_PRICE_PRECISION {
            return Err(Error::construction(
                "price_precision",
                format!(
                    "must be at most {MAX_PRICE_PRECISION}, got {}",
                    self.price_precision
                ),
            ));
        }
        Ok(())
    }
}

/// Which open positions are flattened before a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Close positions whose side differs from the new order's side.
    #[default]
    CloseOpposite,
    /// Close every open position.
    CloseAll,
}

impl ReconcilePolicy {
    pub fn should_close(&self, position: &Position, target: Side) -> bool {
        match self {
            ReconcilePolicy::CloseOpposite => position.side != target,
            ReconcilePolicy::CloseAll => true,
        }
    }
}

/// Whether the bot is running against the real exchange or simulating fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Run-state of the candle event lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}
