//! Seat-map extractor for Khalti `showinfo-v2` payloads.
//!
//! Every active, non-gap seat is counted once under its ticket type. Prices
//! come from `showinfo.tickets[]` matched on `price_level`.

use super::{is_truthy, key_string, lenient_f64, PriceUnit};
use crate::error::{Result, ScraperError};
use crate::observability::metrics;
use crate::types::{NormalizedRow, RowOutcome, ShowIdentity, TicketTotals};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ShowInfoPayload {
    #[serde(default)]
    new_seats: Option<Vec<SeatRow>>,
    #[serde(default)]
    showinfo: Option<ShowInfo>,
}

#[derive(Debug, Deserialize)]
struct SeatRow {
    #[serde(default)]
    seats: Vec<Seat>,
}

#[derive(Debug, Deserialize)]
struct Seat {
    #[serde(default)]
    is_active: Value,
    #[serde(default)]
    seat_status: Option<String>,
    #[serde(default)]
    ticket_type: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ShowInfo {
    #[serde(default)]
    tickets: Option<Vec<Ticket>>,
    #[serde(default)]
    show: Option<ShowMeta>,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    #[serde(default)]
    price_level: Option<Value>,
    #[serde(default)]
    price: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ShowMeta {
    #[serde(default)]
    datetime: Option<String>,
    #[serde(default)]
    theatre_name: Option<Value>,
    #[serde(default)]
    auditorium_name: Option<Value>,
}

/// Seat counts for one ticket type.
#[derive(Debug, Default, Clone, Copy)]
struct TypeTotals {
    price: f64,
    seats: u64,
    sold: u64,
    reserved: u64,
    available: u64,
}

/// Turns a raw showinfo body into a row. Never fails: structural problems
/// come back as `RowOutcome::Skipped` with the error text.
pub fn extract(
    raw: &[u8],
    identity: &ShowIdentity,
    movie_name: &str,
    fallback_date: &str,
    price_unit: PriceUnit,
) -> RowOutcome {
    match try_extract(raw, identity, movie_name, fallback_date, price_unit) {
        Ok(row) => RowOutcome::Ok(row),
        Err(e) => {
            metrics::extract::row_skipped();
            debug!(show = %identity, error = %e, "Seat map unusable, show skipped");
            RowOutcome::Skipped {
                identity: identity.clone(),
                movie_name: movie_name.to_string(),
                date: fallback_date.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn try_extract(
    raw: &[u8],
    identity: &ShowIdentity,
    movie_name: &str,
    fallback_date: &str,
    price_unit: PriceUnit,
) -> Result<NormalizedRow> {
    let payload: ShowInfoPayload = serde_json::from_slice(raw)
        .map_err(|e| ScraperError::MalformedPayload(format!("showinfo: {}", e)))?;
    let showinfo = payload.showinfo.unwrap_or_default();

    let mut by_type: BTreeMap<Option<String>, TypeTotals> = BTreeMap::new();
    for seat in payload.new_seats.unwrap_or_default().iter().flat_map(|row| row.seats.iter()) {
        let status = seat.seat_status.as_deref();
        if !is_truthy(&seat.is_active) || status == Some("Gap") {
            continue;
        }
        let entry = by_type.entry(seat.ticket_type.as_ref().map(key_string)).or_default();
        entry.seats += 1;
        match status {
            Some("Sold") => entry.sold += 1,
            Some("Reserved") => entry.reserved += 1,
            _ => entry.available += 1,
        }
    }

    for ticket in showinfo.tickets.as_deref().unwrap_or_default() {
        let level = ticket.price_level.as_ref().map(key_string);
        let raw_price = match &ticket.price {
            Some(Value::Null) | None => 0.0,
            Some(v) => lenient_f64(v)?,
        };
        if let Some(entry) = by_type.get_mut(&level) {
            entry.price = price_unit.to_major(raw_price);
        }
    }

    let totals = by_type.values().fold(TicketTotals::default(), |mut acc, t| {
        acc.seats += t.seats;
        acc.sold += t.sold;
        acc.reserved += t.reserved;
        acc.available += t.available;
        acc.gross += t.price * (t.sold + t.reserved) as f64;
        acc
    });
    if !totals.gross.is_finite() {
        return Err(ScraperError::MalformedPayload(format!("gross out of range: {}", totals.gross)));
    }

    let show = showinfo.show.unwrap_or_default();
    let datetime = show.datetime.unwrap_or_default();
    let mut parts = datetime.splitn(2, ' ');
    let date = parts.next().filter(|d| !d.is_empty()).unwrap_or(fallback_date).to_string();
    let time = parts.next().map(|t| t.chars().take(5).collect::<String>());

    let mut row = NormalizedRow::from_totals(identity, movie_name, date, totals);
    row.theatre = theatre_label(show.theatre_name.as_ref(), show.auditorium_name.as_ref());
    row.time = time;
    Ok(row)
}

/// `"{theatre} - {auditorium}"`, dropping whichever half is missing.
fn theatre_label(theatre: Option<&Value>, auditorium: Option<&Value>) -> Option<String> {
    let present: Vec<String> = [theatre, auditorium]
        .into_iter()
        .flatten()
        .filter(|v| !v.is_null())
        .map(key_string)
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(" - "))
    }
}

/// Venue segment of a Khalti show id (`movie:venue:slot`), or the whole id.
pub fn venue_from_show_id(show_id: &str) -> &str {
    show_id.split(':').nth(1).unwrap_or(show_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> ShowIdentity {
        ShowIdentity::new("1", "VenueA", "X:VenueA:1")
    }

    fn run(payload: Value) -> RowOutcome {
        let raw = serde_json::to_vec(&payload).unwrap();
        extract(&raw, &identity(), "A", "2025-12-09", PriceUnit::Minor)
    }

    #[test]
    fn two_sold_gold_seats() {
        let outcome = run(json!({
            "new_seats": [{"seats": [
                {"is_active": true, "seat_status": "Sold", "ticket_type": "gold"},
                {"is_active": true, "seat_status": "Sold", "ticket_type": "gold"}
            ]}],
            "showinfo": {
                "tickets": [{"price_level": "gold", "price": 500}],
                "show": {"datetime": "2025-12-09 12:00:00", "theatre_name": "QFX", "auditorium_name": "Audi 1"}
            }
        }));
        let row = match outcome {
            RowOutcome::Ok(row) => row,
            other => panic!("expected row, got {:?}", other),
        };
        assert_eq!(row.seats, 2);
        assert_eq!(row.sold, 2);
        assert_eq!(row.reserved, 0);
        assert_eq!(row.available, 0);
        assert_eq!(row.gross, 10.0);
        assert_eq!(row.occupancy_percent, 100.0);
        assert_eq!(row.date, "2025-12-09");
        assert_eq!(row.time.as_deref(), Some("12:00"));
        assert_eq!(row.theatre.as_deref(), Some("QFX - Audi 1"));
    }

    #[test]
    fn gaps_and_inactive_seats_are_not_counted() {
        let outcome = run(json!({
            "new_seats": [{"seats": [
                {"is_active": true, "seat_status": "Gap", "ticket_type": "std"},
                {"is_active": false, "seat_status": "Sold", "ticket_type": "std"},
                {"is_active": 1, "seat_status": "Reserved", "ticket_type": "std"},
                {"is_active": true, "seat_status": "Available", "ticket_type": "std"},
                {"is_active": true, "seat_status": "Blocked", "ticket_type": "std"}
            ]}],
            "showinfo": {"tickets": [{"price_level": "std", "price": 35000}]}
        }));
        let row = outcome.into_row();
        assert!(!row.skipped);
        assert_eq!(row.seats, 3);
        assert_eq!(row.reserved, 1);
        assert_eq!(row.available, 2);
        assert_eq!(row.gross, 350.0);
        assert_eq!(row.occupancy_percent, 33.33);
        assert_eq!(row.sold + row.reserved + row.available, row.seats);
        // no datetime in payload
        assert_eq!(row.date, "2025-12-09");
        assert_eq!(row.theatre, None);
    }

    #[test]
    fn unpriced_ticket_type_contributes_no_gross() {
        let outcome = run(json!({
            "new_seats": [{"seats": [
                {"is_active": true, "seat_status": "Sold", "ticket_type": "vip"},
                {"is_active": true, "seat_status": "Sold"}
            ]}],
            "showinfo": {"tickets": [{"price_level": "gold", "price": 500}]}
        }));
        let row = outcome.into_row();
        assert_eq!(row.sold, 2);
        assert_eq!(row.gross, 0.0);
    }

    #[test]
    fn non_numeric_ticket_price_skips_the_show() {
        for price in [json!("NaN"), json!("inf"), json!(1.7e308)] {
            let raw = serde_json::to_vec(&json!({
                "new_seats": [{"seats": [
                    {"is_active": true, "seat_status": "Sold", "ticket_type": "gold"},
                    {"is_active": true, "seat_status": "Sold", "ticket_type": "gold"}
                ]}],
                "showinfo": {"tickets": [{"price_level": "gold", "price": price}]}
            }))
            .unwrap();
            let outcome = extract(&raw, &identity(), "A", "2025-12-09", PriceUnit::Major);
            assert!(outcome.is_skipped(), "price {} produced a row", price);
            assert_eq!(outcome.into_row().gross, 0.0);
        }
    }

    #[test]
    fn empty_seat_map_gives_zero_occupancy() {
        let row = run(json!({"new_seats": [], "showinfo": {}})).into_row();
        assert!(!row.skipped);
        assert_eq!(row.seats, 0);
        assert_eq!(row.occupancy_percent, 0.0);
    }

    #[test]
    fn garbage_payload_is_skipped_not_fatal() {
        let outcome = extract(b"<html>oops</html>", &identity(), "A", "2025-12-09", PriceUnit::Minor);
        assert!(outcome.is_skipped());
        let row = outcome.into_row();
        assert!(row.skipped);
        assert_eq!(row.venue, "VenueA");
        assert!(row.error.unwrap().contains("showinfo"));
    }

    #[test]
    fn venue_is_second_segment_of_show_id() {
        assert_eq!(venue_from_show_id("X:VenueA:1"), "VenueA");
        assert_eq!(venue_from_show_id("plain"), "plain");
    }
}
