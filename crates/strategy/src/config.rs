//! Binding of flat `key=value` strategy files to typed parameter records.
//!
//! Each strategy declares a parameter record implementing [`StrategyParams`].
//! [`resolve`] coerces every field or falls back to the record's defaults as a
//! whole; a record is never partially populated from a file.

use std::fmt::Debug;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use common::RawConfig;

/// Why a raw config could not be bound to a parameter record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("missing field '{0}'")]
    Missing(&'static str),

    #[error("unknown field '{0}'")]
    Unknown(String),

    #[error("field '{field}' has invalid value '{value}', expected {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// A typed strategy parameter record.
pub trait StrategyParams: Default + Debug + Sized {
    /// Every field name a config file must supply.
    const FIELDS: &'static [&'static str];

    /// Coerce all fields. Any error discards the whole record.
    fn coerce(params: &Params<'_>) -> Result<Self, ParamError>;
}

/// Field-by-field view over a raw config.
pub struct Params<'a> {
    raw: &'a RawConfig,
}

impl<'a> Params<'a> {
    /// Fails on any key that is not in `fields`.
    pub fn new(raw: &'a RawConfig, fields: &[&str]) -> Result<Self, ParamError> {
        let mut unknown: Vec<&String> = raw
            .keys()
            .filter(|key| !fields.contains(&key.as_str()))
            .collect();
        unknown.sort();
        if let Some(key) = unknown.first() {
            return Err(ParamError::Unknown((*key).clone()));
        }
        Ok(Self { raw })
    }

    fn get(&self, field: &'static str) -> Result<&'a str, ParamError> {
        self.raw
            .get(field)
            .map(|v| v.trim())
            .ok_or(ParamError::Missing(field))
    }

    /// Non-negative integer.
    pub fn int(&self, field: &'static str) -> Result<usize, ParamError> {
        let value = self.get(field)?;
        value.parse().map_err(|_| ParamError::Invalid {
            field,
            value: value.to_string(),
            expected: "a non-negative integer",
        })
    }

    /// Finite float.
    pub fn float(&self, field: &'static str) -> Result<f64, ParamError> {
        let value = self.get(field)?;
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParamError::Invalid {
                field,
                value: value.to_string(),
                expected: "a finite number",
            })
    }

    /// Enum by its case-sensitive name.
    pub fn kind<T: FromStr>(&self, field: &'static str) -> Result<T, ParamError> {
        let value = self.get(field)?;
        value.parse().map_err(|_| ParamError::Invalid {
            field,
            value: value.to_string(),
            expected: "a known kind name",
        })
    }
}

/// Bind `raw` to `P`, or return `P::default()`.
///
/// `None` means no config file was selected. Fallbacks are logged.
pub fn resolve<P: StrategyParams>(strategy: &str, raw: Option<&RawConfig>) -> P {
    let Some(raw) = raw else {
        info!(strategy, "No strategy config found, using defaults");
        return P::default();
    };

    match Params::new(raw, P::FIELDS).and_then(|params| P::coerce(&params)) {
        Ok(params) => params,
        Err(e) => {
            let defaults = P::default();
            warn!(
                strategy,
                error = %e,
                defaults = ?defaults,
                "Invalid strategy config, using defaults"
            );
            defaults
        }
    }
}
