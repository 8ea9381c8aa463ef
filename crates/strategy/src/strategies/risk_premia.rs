use std::sync::Arc;

use common::frame::CLOSE;
use common::{Error, Frame, RawConfig, Result, Side, TradeConfig};

use crate::config::{resolve, ParamError, Params, StrategyParams};
use crate::indicators::rolling_skew;
use crate::{last_value, side_column, with_columns, Decision, Strategy};

pub const SKEW: &str = "skew";

#[derive(Debug, Clone, PartialEq)]
pub struct RiskPremiaParams {
    pub skew_period: usize,
    /// Only the magnitude is used; the band is symmetric.
    pub skew_threshold: f64,
}

impl Default for RiskPremiaParams {
    fn default() -> Self {
        Self {
            skew_period: 10,
            skew_threshold: 0.6,
        }
    }
}

impl StrategyParams for RiskPremiaParams {
    const FIELDS: &'static [&'static str] = &["skew_period", "skew_threshold"];

    fn coerce(params: &Params<'_>) -> Result<Self, ParamError> {
        Ok(Self {
            skew_period: params.int("skew_period")?,
            skew_threshold: params.float("skew_threshold")?,
        })
    }
}

/// Harvests the skew premium: long when recent closes are negatively skewed,
/// short when positively skewed.
pub struct RiskPremia {
    trade_config: Arc<TradeConfig>,
    params: RiskPremiaParams,
}

impl RiskPremia {
    pub const KEY: &'static str = "risk_premia";
    pub const NAME: &'static str = "Risk Premia";

    pub fn new(trade_config: Arc<TradeConfig>, params: RiskPremiaParams) -> Result<Self> {
        if params.skew_period < 3 {
            return Err(Error::construction(
                "skew_period",
                format!("must be at least 3, got {}", params.skew_period),
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

    pub fn params(&self) -> &RiskPremiaParams {
        &self.params
    }

    pub fn get_side(&self, skew: f64) -> Side {
        let band = self.params.skew_threshold.abs();
        if skew < -band {
            Side::Buy
        } else if skew > band {
            Side::Sell
        } else {
            Side::Neutral
        }
    }
}

impl Strategy for RiskPremia {
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
        self.params.skew_period.saturating_mul(2)
    }

    fn describe(&self) -> String {
        format!(
            "Skew Period: {} Threshold: +/-{}",
            self.params.skew_period,
            self.params.skew_threshold.abs()
        )
    }

    fn compute(&self, history: &Frame) -> Result<Frame> {
        let close = history.require(CLOSE)?;
        let skew = rolling_skew(close, self.params.skew_period);
        let sides = side_column(close.len(), |i| self.get_side(skew[i]));
        with_columns(history, vec![(SKEW, skew)], sides)
    }

    fn decide(&self, frame: &Frame) -> Decision {
        let side = frame.last_side();
        let skew = last_value(frame, SKEW);
        Decision {
            side,
            trade: !side.is_neutral(),
            summary: format!("Skew: {skew:.4} Side: {side}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Interval;

    fn premia(params: RiskPremiaParams) -> Result<RiskPremia> {
        RiskPremia::new(
            Arc::new(TradeConfig::new("BTCUSDT", Interval::Hour1, "linear")),
            params,
        )
    }

    fn closes(values: Vec<f64>) -> Frame {
        Frame::new((0..values.len() as i64).collect())
            .with_column(CLOSE, values)
            .unwrap()
    }

    #[test]
    fn negative_threshold_is_symmetric() {
        let s = premia(RiskPremiaParams {
            skew_period: 5,
            skew_threshold: -0.6,
        })
        .unwrap();
        assert_eq!(s.get_side(-0.7), Side::Buy);
        assert_eq!(s.get_side(0.7), Side::Sell);
        assert_eq!(s.get_side(0.6), Side::Neutral);
    }

    #[test]
    fn short_skew_period_is_rejected() {
        assert!(matches!(
            premia(RiskPremiaParams {
                skew_period: 2,
                skew_threshold: 0.6,
            }),
            Err(Error::Construction { parameter: "skew_period", .. })
        ));
    }

    #[test]
    fn crash_bar_skews_negative_and_buys() {
        let s = premia(RiskPremiaParams {
            skew_period: 5,
            skew_threshold: 0.6,
        })
        .unwrap();
        let frame = s
            .compute(&closes(vec![100.0, 100.0, 101.0, 100.0, 101.0, 100.0, 80.0]))
            .unwrap();
        assert!(frame.sides().unwrap()[..4].iter().all(|s| s.is_neutral()));
        assert_eq!(frame.last_side(), Side::Buy);
        assert!(s.decide(&frame).trade);
    }
}
