use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::{Error, Interval, Result, RiskParameters, TradeConfig, TradingMode};

/// Flat `key -> value` map read from a strategy `.ini` file.
pub type RawConfig = HashMap<String, String>;

/// Exchange API credentials, only needed for live trading.
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .finish()
    }
}

/// All runtime configuration, loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,
    /// Present whenever both variables are set; required in live mode.
    pub credentials: Option<ApiCredentials>,

    // Exchange endpoints
    pub rest_url: String,
    pub ws_url: String,
    pub recv_window: u64,

    // What to trade
    pub symbol: String,
    pub interval: Interval,
    pub channel: String,

    /// Root of `strategies/<key>/cfg/*.ini`.
    pub strategies_dir: PathBuf,
    pub risk_config_path: PathBuf,
    pub paper_slippage_bps: f64,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);

        let trading_mode = match env.required("TRADING_MODE")?.to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let credentials = match (env.optional("BYBIT_API_KEY"), env.optional("BYBIT_API_SECRET")) {
            (Some(api_key), Some(api_secret)) => Some(ApiCredentials {
                api_key,
                api_secret,
            }),
            _ if trading_mode == TradingMode::Live => {
                return Err(Error::Config(
                    "BYBIT_API_KEY and BYBIT_API_SECRET are required in live mode".into(),
                ))
            }
            _ => None,
        };

        Ok(Config {
            trading_mode,
            credentials,
            rest_url: env
                .optional("BYBIT_REST_URL")
                .unwrap_or_else(|| "https://api-demo.bybit.com".to_string()),
            ws_url: env
                .optional("BYBIT_WS_URL")
                .unwrap_or_else(|| "wss://stream.bybit.com".to_string()),
            recv_window: env.parsed("BYBIT_RECV_WINDOW", 5_000)?,
            symbol: env
                .optional("SYMBOL")
                .unwrap_or_else(|| "BTCUSDT".to_string()),
            interval: match env.optional("INTERVAL") {
                Some(v) => v.parse()?,
                None => Interval::Min1,
            },
            channel: env
                .optional("CHANNEL")
                .unwrap_or_else(|| "linear".to_string()),
            strategies_dir: env
                .optional("STRATEGIES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("strategies")),
            risk_config_path: env
                .optional("RISK_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/risk.toml")),
            paper_slippage_bps: env.parsed("PAPER_SLIPPAGE_BPS", 10.0)?,
        })
    }

    pub fn trade_config(&self) -> TradeConfig {
        TradeConfig::new(&self.symbol, self.interval, &self.channel)
    }
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key).ok_or_else(|| {
            Error::Config(format!(
                "Required environment variable '{key}' is not set. Check your .env file."
            ))
        })
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
            None => Ok(default),
        }
    }
}

/// Read a `key=value` per-line file into a map.
///
/// Only `.ini` paths are accepted. Lines without `=` are skipped; keys and
/// values are trimmed and the split happens on the first `=`.
pub fn cfg_as_dict(path: impl AsRef<Path>) -> Result<RawConfig> {
    let path = path.as_ref();
    if path.extension().and_then(|e| e.to_str()) != Some("ini") {
        return Err(Error::Config(format!(
            "'{}' is not a configuration file",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect())
}

/// `.ini` file names in `dir`, sorted. `None` when the directory is empty.
pub fn get_configuration_files(dir: impl AsRef<Path>) -> Result<Option<Vec<String>>> {
    let mut entries = 0usize;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        entries += 1;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".ini") && entry.path().is_file() {
            files.push(name);
        }
    }
    if entries == 0 {
        return Ok(None);
    }
    files.sort();
    Ok(Some(files))
}

/// Load risk parameters from a TOML file. A missing file means defaults.
///
/// Example `config/risk.toml`:
/// ```toml
/// quantity = 0.001
/// take_profit = 0.012
/// stop_loss = 0.009
/// leverage = 10
/// price_precision = 2
/// ```
pub fn load_risk_parameters(path: impl AsRef<Path>) -> Result<RiskParameters> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "No risk config found, using defaults");
        return Ok(RiskParameters::default());
    }
    let content = std::fs::read_to_string(path)?;
    let params: RiskParameters = toml::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse risk config at '{}': {e}",
            path.display()
        ))
    })?;
    params.validate()?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn paper_mode_uses_defaults() {
        let cfg = Config::from_lookup(lookup(&[("TRADING_MODE", "paper")])).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert!(cfg.credentials.is_none());
        assert_eq!(cfg.symbol, "BTCUSDT");
        assert_eq!(cfg.interval, Interval::Min1);
        assert_eq!(cfg.channel, "linear");
        assert_eq!(cfg.recv_window, 5_000);
        assert_eq!(cfg.paper_slippage_bps, 10.0);
    }

    #[test]
    fn live_mode_requires_credentials() {
        let err = Config::from_lookup(lookup(&[("TRADING_MODE", "live")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let cfg = Config::from_lookup(lookup(&[
            ("TRADING_MODE", "LIVE"),
            ("BYBIT_API_KEY", "key"),
            ("BYBIT_API_SECRET", "secret"),
            ("INTERVAL", "D"),
        ]))
        .unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.interval, Interval::Day1);
        assert!(!format!("{:?}", cfg.credentials).contains("secret"));
    }

    #[test]
    fn missing_or_invalid_values_are_config_errors() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("TRADING_MODE", "demo")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("TRADING_MODE", "paper"),
            ("PAPER_SLIPPAGE_BPS", "lots")
        ]))
        .is_err());
    }

    #[test]
    fn risk_file_missing_means_defaults() {
        let params = load_risk_parameters("/definitely/not/here/risk.toml").unwrap();
        assert_eq!(params, RiskParameters::default());
    }
}
