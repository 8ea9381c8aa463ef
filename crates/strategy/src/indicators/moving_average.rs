use std::str::FromStr;

/// Moving average flavor, selected by name in strategy files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaKind {
    /// Arithmetic mean over the window.
    #[default]
    Simple,
    /// Exponentially weighted mean with span = window.
    Exponential,
}

impl MaKind {
    pub fn name(&self) -> &'static str {
        match self {
            MaKind::Simple => "SIMPLE",
            MaKind::Exponential => "EXPONENTIAL",
        }
    }

    pub fn apply(&self, values: &[f64], period: usize) -> Vec<f64> {
        match self {
            MaKind::Simple => sma(values, period),
            MaKind::Exponential => ema(values, period),
        }
    }
}

impl FromStr for MaKind {
    type Err = String;

    /// Case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIMPLE" => Ok(MaKind::Simple),
            "EXPONENTIAL" => Ok(MaKind::Exponential),
            other => Err(format!(
                "unknown MA kind '{other}', use SIMPLE or EXPONENTIAL"
            )),
        }
    }
}

impl std::fmt::Display for MaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Simple moving average. NaN until `period` values are available and for any
/// window containing NaN.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    super::rolling_apply(values, period, |window| {
        window.iter().sum::<f64>() / window.len() as f64
    })
}

/// Exponentially weighted mean with `alpha = 2 / (span + 1)` and bias-adjusted
/// weights. Defined from the first observation; NaN inputs keep the previous
/// value and still decay the weights.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if span == 0 {
        out.resize(values.len(), f64::NAN);
        return out;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut weighted = f64::NAN;
    let mut old_weight = 1.0;

    for &value in values {
        if weighted.is_nan() {
            weighted = value;
        } else {
            old_weight *= decay;
            if !value.is_nan() {
                weighted = (old_weight * weighted + value) / (old_weight + 1.0);
                old_weight += 1.0;
            }
        }
        out.push(weighted);
    }
    out
}
