use std::sync::Arc;

use common::frame::CLOSE;
use common::{Error, Frame, RawConfig, Result, Side, TradeConfig};

use crate::config::{resolve, ParamError, Params, StrategyParams};
use crate::indicators::MaKind;
use crate::{crossover, last_value, side_column, with_columns, Decision, Strategy};

pub const FAST_MA: &str = "fast_ma";
pub const SLOW_MA: &str = "slow_ma";

#[derive(Debug, Clone, PartialEq)]
pub struct MaCrossParams {
    pub fast_ma_period: usize,
    pub slow_ma_period: usize,
    pub ma_kind: MaKind,
}

impl Default for MaCrossParams {
    fn default() -> Self {
        Self {
            fast_ma_period: 20,
            slow_ma_period: 100,
            ma_kind: MaKind::Simple,
        }
    }
}

impl StrategyParams for MaCrossParams {
    const FIELDS: &'static [&'static str] = &["fast_ma_period", "slow_ma_period", "ma_kind"];

    fn coerce(params: &Params<'_>) -> Result<Self, ParamError> {
        Ok(Self {
            fast_ma_period: params.int("fast_ma_period")?,
            slow_ma_period: params.int("slow_ma_period")?,
            ma_kind: params.kind("ma_kind")?,
        })
    }
}

/// Fast/slow moving average crossover on close.
///
/// Side is long while the fast average is above the slow one. Trades only on
/// the bar where the side flips.
pub struct MaCross {
    trade_config: Arc<TradeConfig>,
    params: MaCrossParams,
}

impl MaCross {
    pub const KEY: &'static str = "ma_cross";
    pub const NAME: &'static str = "MA Crossover";

    pub fn new(trade_config: Arc<TradeConfig>, params: MaCrossParams) -> Result<Self> {
        if params.fast_ma_period == 0 {
            return Err(Error::construction("fast_ma_period", "must be greater than 0"));
        }
        if params.fast_ma_period > params.slow_ma_period {
            return Err(Error::construction(
                "fast_ma_period",
                format!(
                    "fast MA cannot be greater than slow MA (fast {}, slow {})",
                    params.fast_ma_period, params.slow_ma_period
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

    pub fn params(&self) -> &MaCrossParams {
        &self.params
    }

    pub fn get_side(fast: f64, slow: f64) -> Side {
        if fast > slow {
            Side::Buy
        } else if fast < slow {
            Side::Sell
        } else {
            Side::Neutral
        }
    }
}

impl Strategy for MaCross {
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
        self.params.slow_ma_period.saturating_mul(2)
    }

    fn describe(&self) -> String {
        format!(
            "Fast MA: {} Slow MA: {} Kind: {}",
            self.params.fast_ma_period, self.params.slow_ma_period, self.params.ma_kind
        )
    }

    fn compute(&self, history: &Frame) -> Result<Frame> {
        let close = history.require(CLOSE)?;
        let fast = self.params.ma_kind.apply(close, self.params.fast_ma_period);
        let slow = self.params.ma_kind.apply(close, self.params.slow_ma_period);
        let sides = side_column(close.len(), |i| Self::get_side(fast[i], slow[i]));
        with_columns(history, vec![(FAST_MA, fast), (SLOW_MA, slow)], sides)
    }

    fn decide(&self, frame: &Frame) -> Decision {
        let cross = crossover(frame);
        let fast = last_value(frame, FAST_MA);
        let slow = last_value(frame, SLOW_MA);
        let side = frame.last_side();
        Decision {
            side,
            trade: cross,
            summary: format!("Crossover: {cross} Fast: {fast:.2} Slow: {slow:.2} Side: {side}"),
        }
    }
}
