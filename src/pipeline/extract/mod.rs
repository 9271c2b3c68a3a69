//! Row extractors: one raw upstream show payload in, one normalized row out.
//!
//! Extraction never fails the batch. Structural surprises become
//! `RowOutcome::Skipped`; implausible counts are repaired and flagged.

pub mod categories;
pub mod seat_map;

use crate::error::{Result, ScraperError};
use serde::Deserialize;
use serde_json::Value;

/// Unit the upstream uses for ticket prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    /// Paisa/cents: divide by 100 and round to the nearest whole unit
    #[default]
    Minor,
    /// Already in rupees
    Major,
}

impl PriceUnit {
    pub fn to_major(&self, raw: f64) -> f64 {
        match self {
            PriceUnit::Minor => (raw / 100.0).round_ties_even(),
            PriceUnit::Major => raw,
        }
    }
}

/// Movie-level fields copied onto every row of that movie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieContext {
    pub movie_id: String,
    pub movie_name: String,
    pub format: Option<String>,
    pub language: Option<String>,
    pub release: Option<String>,
}

/// Integer from a number or numeric string; floats truncate toward zero.
/// Non-finite or out-of-range values are rejected.
pub(crate) fn lenient_i64(value: &Value) -> Result<i64> {
    let whole = |f: f64| (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f.trunc() as i64);
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole))
            .ok_or_else(|| ScraperError::MalformedPayload(format!("not an integer: {}", n))),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
                .ok_or_else(|| ScraperError::MalformedPayload(format!("not an integer: {:?}", s)))
        }
        other => Err(ScraperError::MalformedPayload(format!("not an integer: {}", other))),
    }
}

/// Finite number from a number or numeric string. `NaN` and infinities are rejected:
/// they cannot be written back as JSON numbers.
pub(crate) fn lenient_f64(value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| ScraperError::MalformedPayload(format!("not a number: {}", value)))
}

/// Loose truthiness for flags that arrive as bools, numbers or strings.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// String form of an id-like value: strings verbatim, everything else as JSON.
pub(crate) fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
