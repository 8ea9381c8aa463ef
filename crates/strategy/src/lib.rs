pub mod config;
pub mod indicators;
pub mod registry;
pub mod strategies;

pub use config::{resolve, ParamError, Params, StrategyParams};
pub use registry::{StrategyEntry, StrategyRegistry, MAX_FETCH_WINDOW};
pub use strategies::{
    Demo, MaCross, MaCrossParams, MeanReversion, MeanReversionParams, RiskPremia,
    RiskPremiaParams, Rsi, RsiParams,
};

use common::{frame, Frame, ReconcilePolicy, Result, Side, TradeConfig};

/// What a strategy wants done after the latest closed bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub side: Side,
    /// Whether the side should be acted on now.
    pub trade: bool,
    /// Indicator readout for the per-candle log line.
    pub summary: String,
}

/// All strategy implementations must satisfy this trait.
///
/// `compute` must be a pure function of its input: the same history gives the
/// same frame whether it is called per live bar or once over a backtest window,
/// and row `t` never depends on rows after `t`.
pub trait Strategy: Send + Sync {
    /// Human-readable name, e.g. "MA Crossover".
    fn name(&self) -> &str;

    /// Registry key, e.g. "ma_cross".
    fn key(&self) -> &'static str;

    fn trade_config(&self) -> &TradeConfig;

    /// Closed bars to request per evaluation. Covers the slowest warm-up.
    fn fetch_window(&self) -> usize;

    /// Parameter readout for logs.
    fn describe(&self) -> String;

    /// Append indicator columns and `calculated_side` to `history`.
    ///
    /// Fails only when `history` has no `close` column.
    fn compute(&self, history: &Frame) -> Result<Frame>;

    /// Read the trade decision off the last row of a computed frame.
    fn decide(&self, frame: &Frame) -> Decision;

    fn reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy::CloseOpposite
    }
}

/// True iff the last two rows carry different non-neutral sides and neither
/// row has a NaN in any column.
pub fn crossover(frame: &Frame) -> bool {
    let len = frame.len();
    if len < 2 {
        return false;
    }
    if frame.row_has_nan(len - 1) || frame.row_has_nan(len - 2) {
        return false;
    }
    let (last, prev) = (frame.side_back(0), frame.side_back(1));
    !last.is_neutral() && !prev.is_neutral() && last != prev
}

/// Last side is non-neutral and differs from the one before it.
pub(crate) fn entered(frame: &Frame) -> bool {
    let last = frame.last_side();
    !last.is_neutral() && last != frame.side_back(1)
}

/// Encode one side per row. NaN comparisons fall through to `Neutral`.
pub(crate) fn side_column(len: usize, side_at: impl Fn(usize) -> Side) -> Vec<f64> {
    (0..len).map(|i| side_at(i).signal()).collect()
}

/// Copy of `history` with `columns` and the side column appended.
pub(crate) fn with_columns(
    history: &Frame,
    columns: Vec<(&str, Vec<f64>)>,
    sides: Vec<f64>,
) -> Result<Frame> {
    let mut out = history.clone();
    for (name, values) in columns {
        out.set_column(name, values)?;
    }
    out.set_column(frame::CALCULATED_SIDE, sides)?;
    Ok(out)
}

/// `value` at the last row of `column`, NaN if absent.
pub(crate) fn last_value(frame: &Frame, column: &str) -> f64 {
    frame
        .len()
        .checked_sub(1)
        .and_then(|row| frame.value(column, row))
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::frame::{CALCULATED_SIDE, CLOSE};

    fn frame(closes: Vec<f64>, sides: Vec<f64>) -> Frame {
        let index = (0..closes.len() as i64).collect();
        Frame::new(index)
            .with_column(CLOSE, closes)
            .unwrap()
            .with_column(CALCULATED_SIDE, sides)
            .unwrap()
    }

    #[test]
    fn crossover_requires_two_different_non_neutral_sides() {
        assert!(crossover(&frame(vec![1.0, 2.0], vec![1.0, -1.0])));
        assert!(crossover(&frame(vec![1.0, 2.0], vec![-1.0, 1.0])));
        assert!(!crossover(&frame(vec![1.0, 2.0], vec![1.0, 1.0])));
        assert!(!crossover(&frame(vec![1.0, 2.0], vec![0.0, 1.0])));
        assert!(!crossover(&frame(vec![1.0, 2.0], vec![-1.0, 0.0])));
    }

    #[test]
    fn crossover_false_on_nan_or_short_frames() {
        assert!(!crossover(&frame(vec![f64::NAN, 2.0], vec![1.0, -1.0])));
        assert!(!crossover(&frame(vec![2.0], vec![1.0])));
        assert!(!crossover(&Frame::default()));
    }

    #[test]
    fn entry_into_a_band() {
        assert!(entered(&frame(vec![1.0, 2.0], vec![0.0, 1.0])));
        assert!(entered(&frame(vec![1.0, 2.0], vec![1.0, -1.0])));
        assert!(!entered(&frame(vec![1.0, 2.0], vec![1.0, 1.0])));
        assert!(!entered(&frame(vec![1.0, 2.0], vec![1.0, 0.0])));
        assert!(entered(&frame(vec![2.0], vec![-1.0])));
    }
}
