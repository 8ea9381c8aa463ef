use std::sync::Arc;

use common::frame::CLOSE;
use common::{Error, Frame, RawConfig, Result, Side, TradeConfig};

use crate::config::{resolve, ParamError, Params, StrategyParams};
use crate::indicators::wilder_rsi;
use crate::{last_value, side_column, with_columns, Decision, Strategy};

pub const RSI: &str = "rsi";

#[derive(Debug, Clone, PartialEq)]
pub struct RsiParams {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

impl StrategyParams for RsiParams {
    const FIELDS: &'static [&'static str] = &["period", "overbought", "oversold"];

    fn coerce(params: &Params<'_>) -> Result<Self, ParamError> {
        Ok(Self {
            period: params.int("period")?,
            overbought: params.float("overbought")?,
            oversold: params.float("oversold")?,
        })
    }
}

/// Buy oversold, sell overbought.
pub struct Rsi {
    trade_config: Arc<TradeConfig>,
    params: RsiParams,
}

impl Rsi {
    pub const KEY: &'static str = "rsi";
    pub const NAME: &'static str = "RSI";

    pub fn new(trade_config: Arc<TradeConfig>, params: RsiParams) -> Result<Self> {
        if params.period == 0 || params.overbought <= 0.0 || params.oversold <= 0.0 {
            let parameter = if params.period == 0 {
                "period"
            } else if params.overbought <= 0.0 {
                "overbought"
            } else {
                "oversold"
            };
            return Err(Error::construction(
                parameter,
                format!(
                    "values must be positive (period {}, overbought {}, oversold {})",
                    params.period, params.overbought, params.oversold
                ),
            ));
        }
        if params.period < 2 {
            return Err(Error::construction(
                "period",
                format!("must be at least 2, got {}", params.period),
            ));
        }
        if params.oversold > params.overbought {
            return Err(Error::construction(
                "oversold",
                format!(
                    "cannot exceed overbought (overbought {}, oversold {})",
                    params.overbought, params.oversold
                ),
            ));
        }
        Ok(Self {
            trade_config,
            params,
        })
    }

    pub fn from_config(trade_config: Arc<TradeConfig>, raw: Option<&RawConfig>) -> Result<Self> {
        Self::new(trade_config, resolve(Self::KEY, raw))
    }

    pub fn params(&self) -> &RsiParams {
        &self.params
    }

    pub fn get_side(&self, rsi: f64) -> Side {
        if rsi > self.params.overbought {
            Side::Sell
        } else if rsi < self.params.oversold {
            Side::Buy
        } else {
            Side::Neutral
        }
    }
}

impl Strategy for Rsi {
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
        self.params.period.saturating_mul(2)
    }

    fn describe(&self) -> String {
        format!(
            "Period: {} Overbought: {} Oversold: {}",
            self.params.period, self.params.overbought, self.params.oversold
        )
    }

    fn compute(&self, history: &Frame) -> Result<Frame> {
        let close = history.require(CLOSE)?;
        let rsi = wilder_rsi(close, self.params.period);
        let sides = side_column(close.len(), |i| self.get_side(rsi[i]));
        with_columns(history, vec![(RSI, rsi)], sides)
    }

    fn decide(&self, frame: &Frame) -> Decision {
        let side = frame.last_side();
        let trade = !side.is_neutral();
        let rsi = last_value(frame, RSI);
        Decision {
            side,
            trade,
            summary: format!("Trade Valid: {trade} RSI: {rsi:.2}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Interval;

    fn rsi(params: RsiParams) -> Result<Rsi> {
        Rsi::new(
            Arc::new(TradeConfig::new("BTCUSDT", Interval::Min15, "linear")),
            params,
        )
    }

    fn closes(values: Vec<f64>) -> Frame {
        Frame::new((0..values.len() as i64).collect())
            .with_column(CLOSE, values)
            .unwrap()
    }

    #[test]
    fn construction_checks() {
        let bad = [
            RsiParams { period: 0, ..RsiParams::default() },
            RsiParams { period: 1, ..RsiParams::default() },
            RsiParams { oversold: 80.0, ..RsiParams::default() },
            RsiParams { overbought: -5.0, ..RsiParams::default() },
        ];
        for params in bad {
            assert!(matches!(rsi(params), Err(Error::Construction { .. })));
        }
        assert!(rsi(RsiParams::default()).is_ok());
    }

    #[test]
    fn steady_rally_is_overbought() {
        let s = rsi(RsiParams { period: 3, ..RsiParams::default() }).unwrap();
        let frame = s
            .compute(&closes(vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]))
            .unwrap();
        let sides = frame.sides().unwrap();
        assert!(sides[..3].iter().all(|s| s.is_neutral()));
        assert_eq!(frame.last_side(), Side::Sell);
        assert!(s.decide(&frame).trade);
    }

    #[test]
    fn steady_decline_is_oversold() {
        let s = rsi(RsiParams { period: 3, ..RsiParams::default() }).unwrap();
        let frame = s
            .compute(&closes(vec![15.0, 14.0, 13.0, 12.0, 11.0, 10.0]))
            .unwrap();
        assert_eq!(frame.last_side(), Side::Buy);
    }

    #[test]
    fn short_history_never_trades() {
        let s = rsi(RsiParams::default()).unwrap();
        let frame = s.compute(&closes(vec![1.0, 2.0, 3.0])).unwrap();
        let decision = s.decide(&frame);
        assert_eq!(decision.side, Side::Neutral);
        assert!(!decision.trade);
    }
}
