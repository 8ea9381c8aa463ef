use std::fmt;

use tracing::info;

use common::{ExchangeClient, Frame, Interval, Result};
use strategy::Strategy;

use crate::{Backtest, EquityCurve};

/// History requested for a backtest run.
pub const DEFAULT_BARS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub strategy: String,
    pub symbol: String,
    pub interval: Interval,
    pub bars: usize,
    /// Bars where the applied side differs from the previous bar's.
    pub position_changes: usize,
    pub bars_in_market: usize,
    /// Final cumulative log-return.
    pub final_log_return: f64,
    pub total_return_pct: f64,
    /// Largest peak-to-trough fall of the cumulative log-return.
    pub max_drawdown: f64,
}

impl BacktestReport {
    pub fn from_curve(strategy: &dyn Strategy, curve: &EquityCurve) -> Self {
        let tc = strategy.trade_config();
        let final_log_return = curve.final_return();
        Self {
            strategy: strategy.name().to_string(),
            symbol: tc.symbol.clone(),
            interval: tc.interval,
            bars: curve.len(),
            position_changes: position_changes(&curve.signal),
            bars_in_market: curve
                .signal
                .iter()
                .filter(|s| !s.is_nan() && **s != 0.0)
                .count(),
            final_log_return,
            total_return_pct: (final_log_return.exp() - 1.0) * 100.0,
            max_drawdown: max_drawdown(&curve.cumm_returns),
        }
    }
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backtest Report: {}", self.strategy)?;
        writeln!(f, "------------------------------------")?;
        writeln!(f, "{:<25} {}", "Symbol", self.symbol)?;
        writeln!(f, "{:<25} {}", "Interval", self.interval)?;
        writeln!(f, "{:<25} {}", "Bars", self.bars)?;
        writeln!(f, "{:<25} {}", "Position Changes", self.position_changes)?;
        writeln!(f, "{:<25} {}", "Bars In Market", self.bars_in_market)?;
        writeln!(f, "------------------------------------")?;
        writeln!(f, "{:<25} {:.6}", "Cumulative Log Return", self.final_log_return)?;
        writeln!(f, "{:<25} {:.2}%", "Total Return", self.total_return_pct)?;
        writeln!(f, "{:<25} {:.6}", "Max Drawdown (log)", self.max_drawdown)?;
        writeln!(f, "------------------------------------")
    }
}

fn position_changes(signal: &[f64]) -> usize {
    signal
        .windows(2)
        .filter(|w| !w[0].is_nan() && !w[1].is_nan() && w[0] != w[1])
        .count()
}

/// Measured from a flat start, NaN rows skipped.
fn max_drawdown(cumulative: &[f64]) -> f64 {
    let mut peak = 0.0f64;
    let mut worst = 0.0f64;
    for &value in cumulative.iter().filter(|v| !v.is_nan()) {
        peak = peak.max(value);
        worst = worst.max(peak - value);
    }
    worst
}

/// Fetch `bars` of history, compute the strategy over it and replay.
pub async fn run_backtest(
    strategy: &dyn Strategy,
    client: &dyn ExchangeClient,
    bars: usize,
) -> Result<(BacktestReport, Frame)> {
    let tc = strategy.trade_config();
    let history = client.historical_bars(tc, bars).await?;
    info!(
        strategy = %strategy.name(),
        symbol = %tc.symbol,
        bars = history.len(),
        "Backtest history loaded"
    );

    let computed = strategy.compute(&Frame::from_bars(&history))?;
    let backtest = Backtest::new(computed)?;
    let curve = backtest.replay();
    let report = BacktestReport::from_curve(strategy, &curve);
    info!(
        strategy = %report.strategy,
        final_log_return = report.final_log_return,
        total_return_pct = report.total_return_pct,
        max_drawdown = report.max_drawdown,
        "Backtest complete"
    );

    let frame = backtest.into_frame()?;
    Ok((report, frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_tracks_peak_to_trough() {
        assert_eq!(max_drawdown(&[f64::NAN, 0.1, 0.3, 0.0, 0.2]), 0.3);
        assert_eq!(max_drawdown(&[f64::NAN, -0.2, -0.1]), 0.2);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn changes_ignore_warm_up() {
        assert_eq!(position_changes(&[f64::NAN, 0.0, 1.0, 1.0, -1.0]), 2);
    }
}
