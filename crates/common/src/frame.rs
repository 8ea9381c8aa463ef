//! Column-oriented OHLCV table shared by the live signal path and the
//! backtest replay.
//!
//! A [`Frame`] is an ordered millisecond index plus named `f64` columns of the
//! same length. Undefined values (indicator warm-up) are `NaN`.

use crate::{Bar, Error, Result, Side};

pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";
pub const TURNOVER: &str = "turnover";
pub const CALCULATED_SIDE: &str = "calculated_side";

#[derive(Debug, Clone, Default)]
pub struct Frame {
    index: Vec<i64>,
    columns: Vec<(String, Vec<f64>)>,
}

impl Frame {
    pub fn new(index: Vec<i64>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Build the OHLCV columns from bars ordered oldest first.
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut frame = Frame::new(bars.iter().map(|b| b.timestamp).collect());
        let fields: [(&str, fn(&Bar) -> f64); 6] = [
            (OPEN, |b: &Bar| b.open),
            (HIGH, |b: &Bar| b.high),
            (LOW, |b: &Bar| b.low),
            (CLOSE, |b: &Bar| b.close),
            (VOLUME, |b: &Bar| b.volume),
            (TURNOVER, |b: &Bar| b.turnover),
        ];
        for (name, field) in fields {
            frame
                .columns
                .push((name.to_string(), bars.iter().map(field).collect()));
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Like [`Frame::column`], but absence is an error.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    /// Insert or replace a column.
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(Error::Data(format!(
                "column '{name}' has {} rows, frame has {}",
                values.len(),
                self.len()
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name, values)),
        }
        Ok(())
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.set_column(name, values)?;
        Ok(self)
    }

    /// Lower-case every column name. Later duplicates win.
    pub fn normalize_names(&mut self) {
        let columns = std::mem::take(&mut self.columns);
        for (name, values) in columns {
            let lower = name.to_lowercase();
            match self.columns.iter_mut().find(|(n, _)| *n == lower) {
                Some((_, existing)) => *existing = values,
                None => self.columns.push((lower, values)),
            }
        }
    }

    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.column(name).and_then(|values| values.get(row).copied())
    }

    pub fn row_has_nan(&self, row: usize) -> bool {
        self.columns
            .iter()
            .any(|(_, values)| values.get(row).is_some_and(|v| v.is_nan()))
    }

    /// The `calculated_side` column decoded to [`Side`].
    pub fn sides(&self) -> Option<Vec<Side>> {
        self.column(CALCULATED_SIDE)
            .map(|values| values.iter().copied().map(Side::from_signal).collect())
    }

    /// Side of the row `offset` rows before the last one.
    pub fn side_back(&self, offset: usize) -> Side {
        let row = match self.len().checked_sub(offset + 1) {
            Some(row) => row,
            None => return Side::Neutral,
        };
        self.value(CALCULATED_SIDE, row)
            .map(Side::from_signal)
            .unwrap_or_default()
    }

    pub fn last_side(&self) -> Side {
        self.side_back(0)
    }

    /// The first `rows` rows of every column.
    pub fn head(&self, rows: usize) -> Frame {
        let rows = rows.min(self.len());
        Frame {
            index: self.index[..rows].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), values[..rows].to_vec()))
                .collect(),
        }
    }

    /// The last `rows` rows of every column.
    pub fn tail(&self, rows: usize) -> Frame {
        let start = self.len().saturating_sub(rows);
        Frame {
            index: self.index[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| (name.clone(), values[start..].to_vec()))
                .collect(),
        }
    }
}

/// Equality where NaN equals NaN, for comparing indicator output.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|((a_name, a), (b_name, b))| {
                    a_name == b_name
                        && a.len() == b.len()
                        && a.iter()
                            .zip(b)
                            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
                })
    }
}
