//! Category extractor for BookMyShow showtimes.
//!
//! A show lists seat categories with `MaxSeats` / `SeatsAvail`; sold seats are
//! inferred as the difference. Inconsistent counts are zeroed and flagged
//! `badData` instead of failing.

use super::{is_truthy, key_string, lenient_f64, lenient_i64, MovieContext, PriceUnit};
use crate::error::{Result, ScraperError};
use crate::observability::metrics;
use crate::types::{NormalizedRow, RowOutcome, ShowIdentity, TicketTotals};
use serde_json::Value;
use tracing::debug;

/// Session id of a show: `SessionId`, else `Id`, else empty.
pub fn session_id(show: &Value) -> String {
    ["SessionId", "Id"]
        .iter()
        .filter_map(|key| show.get(*key))
        .find(|v| is_truthy(v))
        .map(key_string)
        .unwrap_or_default()
}

/// Turns one `ShowTimes[]` entry into a row keyed by (event code, venue, session).
pub fn extract(show: &Value, venue: &str, movie: &MovieContext, date: &str, price_unit: PriceUnit) -> RowOutcome {
    let identity = ShowIdentity::new(movie.movie_id.clone(), venue, session_id(show));
    match try_extract(show, &identity, movie, date, price_unit) {
        Ok(row) => {
            if row.bad_data {
                metrics::extract::row_bad_data();
            }
            RowOutcome::Ok(row)
        }
        Err(e) => {
            metrics::extract::row_skipped();
            debug!(show = %identity, error = %e, "Show categories unusable, show skipped");
            RowOutcome::Skipped {
                identity,
                movie_name: movie.movie_name.clone(),
                date: date.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn try_extract(
    show: &Value,
    identity: &ShowIdentity,
    movie: &MovieContext,
    date: &str,
    price_unit: PriceUnit,
) -> Result<NormalizedRow> {
    let categories = match show.get("Categories") {
        None => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => {
            return Err(ScraperError::MalformedPayload(format!(
                "Categories is not a list: {}",
                other
            )))
        }
    };

    let mut total: i64 = 0;
    let mut avail: i64 = 0;
    for category in categories {
        total = checked_sum(total, field_or_zero(category, "MaxSeats")?, "MaxSeats")?;
        avail = checked_sum(avail, field_or_zero(category, "SeatsAvail")?, "SeatsAvail")?;
    }
    let price = match show.get("MinPrice") {
        None => 0.0,
        Some(v) => price_unit.to_major(lenient_f64(v)?),
    };

    let sold = total
        .checked_sub(avail)
        .ok_or_else(|| ScraperError::MalformedPayload(format!("seat counts out of range: {} - {}", total, avail)))?;
    let gross = sold as f64 * price;
    let bad_data = sold < 0 || gross < 0.0 || !gross.is_finite() || avail > total || total <= 0 || avail < 0;

    let seats = total.max(0) as u64;
    let totals = if bad_data {
        TicketTotals {
            seats,
            sold: 0,
            reserved: 0,
            available: seats,
            gross: 0.0,
        }
    } else {
        TicketTotals {
            seats,
            sold: sold as u64,
            reserved: 0,
            available: avail as u64,
            gross,
        }
    };

    let mut row = NormalizedRow::from_totals(identity, movie.movie_name.clone(), date, totals);
    row.format = movie.format.clone();
    row.language = movie.language.clone();
    row.release = movie.release.clone();
    row.time = show.get("ShowTime").and_then(Value::as_str).map(str::to_string);
    row.bad_data = bad_data;
    Ok(row)
}

fn checked_sum(acc: i64, value: i64, key: &str) -> Result<i64> {
    acc.checked_add(value)
        .ok_or_else(|| ScraperError::MalformedPayload(format!("{} total out of range", key)))
}

fn field_or_zero(category: &Value, key: &str) -> Result<i64> {
    match category.get(key) {
        None => Ok(0),
        Some(v) => lenient_i64(v),
    }
}
