use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use common::{cfg_as_dict, Error, RawConfig, Result, TradeConfig};

use crate::strategies::{Demo, MaCross, MeanReversion, RiskPremia, Rsi};
use crate::Strategy;

/// Largest window one history request can serve: the exchange caps a kline
/// page at 1000 and the in-progress bar is dropped.
pub const MAX_FETCH_WINDOW: usize = 999;

type Constructor = fn(Arc<TradeConfig>, Option<&RawConfig>) -> Result<Arc<dyn Strategy>>;

/// One row of the static strategy table.
pub struct StrategyEntry {
    pub key: &'static str,
    pub name: &'static str,
    build: Constructor,
}

const ENTRIES: &[StrategyEntry] = &[
    StrategyEntry {
        key: MaCross::KEY,
        name: MaCross::NAME,
        build: build_ma_cross,
    },
    StrategyEntry {
        key: MeanReversion::KEY,
        name: MeanReversion::NAME,
        build: build_mean_reversion,
    },
    StrategyEntry {
        key: Rsi::KEY,
        name: Rsi::NAME,
        build: build_rsi,
    },
    StrategyEntry {
        key: RiskPremia::KEY,
        name: RiskPremia::NAME,
        build: build_risk_premia,
    },
    StrategyEntry {
        key: Demo::KEY,
        name: Demo::NAME,
        build: build_demo,
    },
];

fn build_ma_cross(tc: Arc<TradeConfig>, raw: Option<&RawConfig>) -> Result<Arc<dyn Strategy>> {
    Ok(Arc::new(MaCross::from_config(tc, raw)?))
}

fn build_mean_reversion(
    tc: Arc<TradeConfig>,
    raw: Option<&RawConfig>,
) -> Result<Arc<dyn Strategy>> {
    Ok(Arc::new(MeanReversion::from_config(tc, raw)?))
}

fn build_rsi(tc: Arc<TradeConfig>, raw: Option<&RawConfig>) -> Result<Arc<dyn Strategy>> {
    Ok(Arc::new(Rsi::from_config(tc, raw)?))
}

fn build_risk_premia(tc: Arc<TradeConfig>, raw: Option<&RawConfig>) -> Result<Arc<dyn Strategy>> {
    Ok(Arc::new(RiskPremia::from_config(tc, raw)?))
}

fn build_demo(tc: Arc<TradeConfig>, raw: Option<&RawConfig>) -> Result<Arc<dyn Strategy>> {
    Ok(Arc::new(Demo::from_config(tc, raw)?))
}

/// Fixed `{key -> constructor}` table of every strategy compiled into the bot.
pub struct StrategyRegistry;

impl StrategyRegistry {
    pub fn entries() -> &'static [StrategyEntry] {
        ENTRIES
    }

    pub fn keys() -> impl Iterator<Item = &'static str> {
        ENTRIES.iter().map(|e| e.key)
    }

    pub fn get(key: &str) -> Option<&'static StrategyEntry> {
        ENTRIES.iter().find(|e| e.key == key)
    }

    /// Registered entries whose key is listed in a `key=Label` file. Without
    /// the file every registered entry is available.
    pub fn enabled(list_path: impl AsRef<Path>) -> Result<Vec<&'static StrategyEntry>> {
        let path = list_path.as_ref();
        if !path.exists() {
            return Ok(ENTRIES.iter().collect());
        }
        let listed = cfg_as_dict(path)?;
        for (key, label) in &listed {
            if Self::get(key).is_none() {
                warn!(key = %key, label = %label, "Listed strategy is not registered");
            }
        }
        Ok(ENTRIES
            .iter()
            .filter(|e| listed.contains_key(e.key))
            .collect())
    }

    /// Build a strategy and log its instrument and parameters.
    ///
    /// Unknown keys are configuration errors; invalid parameters are
    /// construction errors.
    pub fn build(
        key: &str,
        trade_config: Arc<TradeConfig>,
        raw: Option<&RawConfig>,
    ) -> Result<Arc<dyn Strategy>> {
        let entry = Self::get(key)
            .ok_or_else(|| Error::Config(format!("unknown strategy '{key}'")))?;
        let strategy = (entry.build)(trade_config, raw)?;

        let window = strategy.fetch_window();
        if window > MAX_FETCH_WINDOW {
            return Err(Error::construction(
                "fetch_window",
                format!("{window} bars exceeds the {MAX_FETCH_WINDOW} bar history limit"),
            ));
        }

        let tc = strategy.trade_config();
        info!(
            strategy = %strategy.name(),
            symbol = %tc.symbol,
            interval = %tc.interval,
            channel = %tc.channel,
            "Instrument configuration"
        );
        info!(
            strategy = %strategy.name(),
            params = %strategy.describe(),
            fetch_window = window,
            "Strategy constructed"
        );
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Interval;

    fn trade_config() -> Arc<TradeConfig> {
        Arc::new(TradeConfig::new("BTCUSDT", Interval::Min1, "linear"))
    }

    fn raw(pairs: &[(&str, &str)]) -> RawConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn every_key_builds_with_defaults() {
        for key in StrategyRegistry::keys() {
            let strategy = StrategyRegistry::build(key, trade_config(), None).unwrap();
            assert_eq!(strategy.key(), key);
            assert!(strategy.fetch_window() <= MAX_FETCH_WINDOW);
        }
    }

    #[test]
    fn unknown_key_is_config_error() {
        assert!(matches!(
            StrategyRegistry::build("bbands", trade_config(), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn oversized_window_is_rejected() {
        let cfg = raw(&[
            ("fast_ma_period", "20"),
            ("slow_ma_period", "600"),
            ("ma_kind", "SIMPLE"),
        ]);
        assert!(matches!(
            StrategyRegistry::build("ma_cross", trade_config(), Some(&cfg)),
            Err(Error::Construction { parameter: "fetch_window", .. })
        ));
    }

    #[test]
    fn huge_periods_are_rejected_not_overflowed() {
        let max = usize::MAX.to_string();
        let max = max.as_str();
        let cases = [
            (
                "ma_cross",
                raw(&[
                    ("fast_ma_period", "20"),
                    ("slow_ma_period", max),
                    ("ma_kind", "SIMPLE"),
                ]),
            ),
            (
                "mean_reversion",
                raw(&[
                    ("mean_period", max),
                    ("spread_mean_period", max),
                    ("spread_sdev_period", "10"),
                    ("threshold", "1.0"),
                    ("ma_kind", "SIMPLE"),
                ]),
            ),
            (
                "rsi",
                raw(&[("period", max), ("overbought", "70"), ("oversold", "30")]),
            ),
            (
                "risk_premia",
                raw(&[("skew_period", max), ("skew_threshold", "0.6")]),
            ),
        ];
        for (key, cfg) in cases {
            assert!(
                matches!(
                    StrategyRegistry::build(key, trade_config(), Some(&cfg)),
                    Err(Error::Construction { parameter: "fetch_window", .. })
                ),
                "{key}"
            );
        }
    }

    #[test]
    fn construction_error_propagates() {
        let cfg = raw(&[
            ("fast_ma_period", "50"),
            ("slow_ma_period", "10"),
            ("ma_kind", "SIMPLE"),
        ]);
        assert!(matches!(
            StrategyRegistry::build("ma_cross", trade_config(), Some(&cfg)),
            Err(Error::Construction { parameter: "fast_ma_period", .. })
        ));
    }

    #[test]
    fn enabled_without_list_is_everything() {
        let entries = StrategyRegistry::enabled("/no/such/strategies.ini").unwrap();
        assert_eq!(entries.len(), StrategyRegistry::entries().len());
    }

    #[test]
    fn enabled_filters_by_list() {
        let dir = std::env::temp_dir().join(format!("registry-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("strategies.ini");
        std::fs::write(&path, "rsi=RSI\nbbands=BBands\nma_cross=MACross\n").unwrap();

        let keys: Vec<_> = StrategyRegistry::enabled(&path)
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["ma_cross", "rsi"]);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
