//! Offline replay of a computed signal table.
//!
//! The side decided at bar `t` is applied from bar `t + 1`, so the strategy
//! return at `t` depends only on `calculated_side[t - 1]` and the closes at
//! `t - 1` and `t`.

pub mod report;

pub use report::{run_backtest, BacktestReport, DEFAULT_BARS};

use common::frame::{CALCULATED_SIDE, CLOSE};
use common::{Frame, Result};

pub const LOG_RETURNS: &str = "log_returns";
pub const SIGNAL: &str = "signal";
pub const STRATEGY_RETURNS: &str = "strategy_returns";
pub const CUMM_RETURNS: &str = "cumm_returns";

/// Replay output, one value per input row.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityCurve {
    pub index: Vec<i64>,
    pub log_returns: Vec<f64>,
    /// Side applied on each bar, i.e. the previous bar's decision.
    pub signal: Vec<f64>,
    pub strategy_returns: Vec<f64>,
    pub cumm_returns: Vec<f64>,
}

impl EquityCurve {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Last defined cumulative log-return, 0.0 when nothing was defined.
    pub fn final_return(&self) -> f64 {
        self.cumm_returns
            .iter()
            .rev()
            .find(|v| !v.is_nan())
            .copied()
            .unwrap_or(0.0)
    }

    /// Write the four replay columns into `frame`, replacing existing ones.
    pub fn append_to(&self, frame: &mut Frame) -> Result<()> {
        frame.set_column(LOG_RETURNS, self.log_returns.clone())?;
        frame.set_column(SIGNAL, self.signal.clone())?;
        frame.set_column(STRATEGY_RETURNS, self.strategy_returns.clone())?;
        frame.set_column(CUMM_RETURNS, self.cumm_returns.clone())
    }
}

pub struct Backtest {
    frame: Frame,
}

impl Backtest {
    /// Column names are lower-cased first. `calculated_side` and `close` must
    /// both be present.
    pub fn new(mut frame: Frame) -> Result<Self> {
        frame.normalize_names();
        frame.require(CALCULATED_SIDE)?;
        frame.require(CLOSE)?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn replay(&self) -> EquityCurve {
        let log_returns = match self.frame.column(LOG_RETURNS) {
            Some(given) => given.to_vec(),
            None => log_returns(self.column(CLOSE)),
        };
        let signal = match self.frame.column(SIGNAL) {
            Some(given) => given.to_vec(),
            None => shift(self.column(CALCULATED_SIDE)),
        };
        let strategy_returns: Vec<f64> = signal
            .iter()
            .zip(&log_returns)
            .map(|(s, r)| s * r)
            .collect();
        let cumm_returns = cumsum(&strategy_returns);

        EquityCurve {
            index: self.frame.index().to_vec(),
            log_returns,
            signal,
            strategy_returns,
            cumm_returns,
        }
    }

    /// The input frame with the replay columns appended.
    pub fn into_frame(mut self) -> Result<Frame> {
        let curve = self.replay();
        curve.append_to(&mut self.frame)?;
        Ok(self.frame)
    }

    fn column(&self, name: &str) -> &[f64] {
        // Presence checked in `new`.
        self.frame.column(name).unwrap_or(&[])
    }
}

/// `ln(close[t] / close[t - 1])`, NaN on the first row.
pub fn log_returns(close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|t| match t {
            0 => f64::NAN,
            _ => (close[t] / close[t - 1]).ln(),
        })
        .collect()
}

/// Values moved one row later, NaN on the first row.
pub fn shift(values: &[f64]) -> Vec<f64> {
    (0..values.len())
        .map(|t| match t {
            0 => f64::NAN,
            _ => values[t - 1],
        })
        .collect()
}

/// Running sum that leaves NaN rows as NaN without resetting the total.
pub fn cumsum(values: &[f64]) -> Vec<f64> {
    let mut total = 0.0;
    values
        .iter()
        .map(|&v| {
            if v.is_nan() {
                f64::NAN
            } else {
                total += v;
                total
            }
        })
        .collect()
}
