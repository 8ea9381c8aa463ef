//! Plumbing check only. Trades the direction of the last closed bar and holds
//! no trading logic meant for live funds.

use std::sync::Arc;

use common::frame::{CLOSE, OPEN};
use common::{Frame, RawConfig, ReconcilePolicy, Result, Side, TradeConfig};

use crate::{last_value, side_column, with_columns, Decision, Strategy};

pub const CHANGE: &str = "change";

pub struct Demo {
    trade_config: Arc<TradeConfig>,
}

impl Demo {
    pub const KEY: &'static str = "demo";
    pub const NAME: &'static str = "Demo Strategy";

    pub fn new(trade_config: Arc<TradeConfig>) -> Self {
        Self { trade_config }
    }

    /// Takes no parameters; any supplied config is ignored.
    pub fn from_config(trade_config: Arc<TradeConfig>, _raw: Option<&RawConfig>) -> Result<Self> {
        Ok(Self::new(trade_config))
    }
}

impl Strategy for Demo {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn trade_config(&self) -> &TradeConfig {
        &self.trade_config
    }

    fn fetch_window(&self) -> usize {
        5
    }

    fn describe(&self) -> String {
        "no parameters".to_string()
    }

    fn compute(&self, history: &Frame) -> Result<Frame> {
        let close = history.require(CLOSE)?;
        let open = history.require(OPEN)?;
        let change: Vec<f64> = close.iter().zip(open).map(|(c, o)| c - o).collect();
        let sides = side_column(change.len(), |i| {
            if change[i] > 0.0 {
                Side::Buy
            } else if change[i] < 0.0 {
                Side::Sell
            } else {
                Side::Neutral
            }
        });
        with_columns(history, vec![(CHANGE, change)], sides)
    }

    fn decide(&self, frame: &Frame) -> Decision {
        let side = frame.last_side();
        Decision {
            side,
            trade: !side.is_neutral(),
            summary: format!("Change: {:.2} Side: {side}", last_value(frame, CHANGE)),
        }
    }

    fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy::CloseAll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Bar, Interval};

    #[test]
    fn side_is_bar_direction() {
        let bars: Vec<Bar> = [(10.0, 11.0), (11.0, 10.0), (10.0, 10.0)]
            .into_iter()
            .enumerate()
            .map(|(i, (open, close))| Bar {
                timestamp: i as i64,
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: 1.0,
                turnover: close,
            })
            .collect();
        let demo = Demo::new(Arc::new(TradeConfig::new("BTCUSDT", Interval::Min1, "linear")));
        let frame = demo.compute(&Frame::from_bars(&bars)).unwrap();
        assert_eq!(
            frame.sides().unwrap(),
            vec![Side::Buy, Side::Sell, Side::Neutral]
        );
        assert!(!demo.decide(&frame).trade);
        assert_eq!(demo.reconcile_policy(), ReconcilePolicy::CloseAll);
    }
}
