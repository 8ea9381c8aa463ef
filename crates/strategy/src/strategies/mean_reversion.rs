use std::sync::Arc;

use common::frame::CLOSE;
use common::{Error, Frame, RawConfig, Result, Side, TradeConfig};

use crate::config::{resolve, ParamError, Params, StrategyParams};
use crate::indicators::{rolling_std, sma, MaKind};
use crate::{entered, last_value, side_column, with_columns, Decision, Strategy};

pub const MEAN: &str = "mean";
pub const SPREAD: &str = "spread";
pub const SPREAD_MEAN: &str = "spread_mean";
pub const SPREAD_SDEV: &str = "spread_sdev";
pub const Z_SCORE: &str = "z_score";

#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversionParams {
    /// Rolling mean the spread is measured against.
    pub mean_period: usize,
    pub spread_mean_period: usize,
    pub spread_sdev_period: usize,
    /// Z-score magnitude that opens a position.
    pub threshold: f64,
    pub ma_kind: MaKind,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        Self {
            mean_period: 20,
            spread_mean_period: 10,
            spread_sdev_period: 10,
            threshold: 1.0,
            ma_kind: MaKind::Simple,
        }
    }
}

impl StrategyParams for MeanReversionParams {
    const FIELDS: &'static [&'static str] = &[
        "mean_period",
        "spread_mean_period",
        "spread_sdev_period",
        "threshold",
        "ma_kind",
    ];

    fn coerce(params: &Params<'_>) -> Result<Self, ParamError> {
        Ok(Self {
            mean_period: params.int("mean_period")?,
            spread_mean_period: params.int("spread_mean_period")?,
            spread_sdev_period: params.int("spread_sdev_period")?,
            threshold: params.float("threshold")?,
            ma_kind: params.kind("ma_kind")?,
        })
    }
}

/// Z-score of the close-to-mean spread against its own rolling statistics.
///
/// Long when the spread is stretched below its mean by `threshold` standard
/// deviations, short when stretched above.
pub struct MeanReversion {
    trade_config: Arc<TradeConfig>,
    params: MeanReversionParams,
}

impl MeanReversion {
    pub const KEY: &'static str = "mean_reversion";
    pub const NAME: &'static str = "Mean Reversion";

    pub fn new(trade_config: Arc<TradeConfig>, params: MeanReversionParams) -> Result<Self> {
        for (parameter, value) in [
            ("mean_period", params.mean_period),
            ("spread_mean_period", params.spread_mean_period),
        ] {
            if value == 0 {
                return Err(Error::construction(parameter, "must be greater than 0"));
            }
        }
        if params.spread_sdev_period < 2 {
            return Err(Error::construction(
                "spread_sdev_period",
                format!("must be at least 2, got {}", params.spread_sdev_period),
            ));
        }
        if !(params.threshold.is_finite() && params.threshold > 0.0) {
            return Err(Error::construction(
                "threshold",
                format!("must be positive, got {}", params.threshold),
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

    pub fn params(&self) -> &MeanReversionParams {
        &self.params
    }

    pub fn get_side(&self, z_score: f64) -> Side {
        if z_score <= -self.params.threshold {
            Side::Buy
        } else if z_score >= self.params.threshold {
            Side::Sell
        } else {
            Side::Neutral
        }
    }
}

impl Strategy for MeanReversion {
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
        let p = &self.params;
        p.mean_period
            .saturating_add(p.spread_mean_period.max(p.spread_sdev_period))
            .saturating_mul(2)
    }

    fn describe(&self) -> String {
        let p = &self.params;
        format!(
            "Mean: {} Spread Mean: {} Spread SDev: {} Threshold: {} Kind: {}",
            p.mean_period, p.spread_mean_period, p.spread_sdev_period, p.threshold, p.ma_kind
        )
    }

    fn compute(&self, history: &Frame) -> Result<Frame> {
        let close = history.require(CLOSE)?;
        let mean = self.params.ma_kind.apply(close, self.params.mean_period);
        let spread: Vec<f64> = close.iter().zip(&mean).map(|(c, m)| c - m).collect();
        let spread_mean = sma(&spread, self.params.spread_mean_period);
        let spread_sdev = rolling_std(&spread, self.params.spread_sdev_period);
        let z_score: Vec<f64> = (0..close.len())
            .map(|i| (spread[i] - spread_mean[i]) / spread_sdev[i])
            .collect();
        let sides = side_column(close.len(), |i| self.get_side(z_score[i]));
        with_columns(
            history,
            vec![
                (MEAN, mean),
                (SPREAD, spread),
                (SPREAD_MEAN, spread_mean),
                (SPREAD_SDEV, spread_sdev),
                (Z_SCORE, z_score),
            ],
            sides,
        )
    }

    fn decide(&self, frame: &Frame) -> Decision {
        let side = frame.last_side();
        let trade = entered(frame);
        let z = last_value(frame, Z_SCORE);
        Decision {
            side,
            trade,
            summary: format!("Trade Valid: {trade} Z-Score: {z:.2} Side: {side}"),
        }
    }
}
