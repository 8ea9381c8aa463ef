/// RSI (Relative Strength Index) series.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// The first `period` rows are NaN: row `period` is seeded from the plain mean
/// gain/loss of the first `period` changes, later rows are Wilder-smoothed.
/// A window with no losses is 100.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let initial = &changes[..period];
    let n = period as f64;

    let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / n;
    let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / n;
    out[period] = rsi_value(avg_gain, avg_loss);

    for (i, &change) in changes.iter().enumerate().skip(period) {
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { change.abs() } else { 0.0 };
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        // changes[i] ends at closes[i + 1]
        out[i + 1] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
