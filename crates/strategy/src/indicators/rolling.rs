/// Apply `f` to every full trailing window of `period` values.
///
/// Rows before the first full window, and windows containing NaN, are NaN.
pub fn rolling_apply(values: &[f64], period: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return f64::NAN;
            }
            let window = &values[i + 1 - period..=i];
            if window.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                f(window)
            }
        })
        .collect()
}

/// Rolling sample standard deviation (n - 1 denominator).
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |window| {
        let n = window.len() as f64;
        if window.len() < 2 {
            return f64::NAN;
        }
        let mean = window.iter().sum::<f64>() / n;
        let ss = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        (ss / (n - 1.0)).sqrt()
    })
}

/// Rolling adjusted Fisher-Pearson skewness. A constant window is 0.
pub fn rolling_skew(values: &[f64], period: usize) -> Vec<f64> {
    rolling_apply(values, period, |window| {
        let len = window.len();
        if len < 3 {
            return f64::NAN;
        }
        if window.iter().all(|v| *v == window[0]) {
            return 0.0;
        }
        let n = len as f64;
        let mean = window.iter().sum::<f64>() / n;
        let m2 = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let m3 = window.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
        if m2 <= 1e-14 {
            return f64::NAN;
        }
        (n * (n - 1.0)).sqrt() / (n - 2.0) * m3 / m2.powf(1.5)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_of_known_window() {
        let out = rolling_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        // population std is 2; sample std is 2 * sqrt(8/7)
        assert!((out[7] - 2.0 * (8.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(out[..7].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn skew_sign_follows_the_tail() {
        let right_tail = rolling_skew(&[1.0, 1.0, 1.0, 1.0, 10.0], 5);
        let left_tail = rolling_skew(&[10.0, 10.0, 10.0, 10.0, 1.0], 5);
        assert!(right_tail[4] > 0.0);
        assert!(left_tail[4] < 0.0);
        assert!((right_tail[4] + left_tail[4]).abs() < 1e-12);
    }

    #[test]
    fn skew_of_symmetric_and_constant_windows() {
        let out = rolling_skew(&[1.0, 2.0, 3.0], 3);
        assert!(out[2].abs() < 1e-12);
        let flat = rolling_skew(&[4.0, 4.0, 4.0], 3);
        assert_eq!(flat[2], 0.0);
    }

    #[test]
    fn zero_period_is_all_nan() {
        assert!(rolling_apply(&[1.0, 2.0], 0, |_| 0.0)
            .iter()
            .all(|v| v.is_nan()));
    }
}
