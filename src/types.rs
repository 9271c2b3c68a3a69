use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Stable key of one sellable session. This is the merge key of the Detailed file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShowIdentity {
    /// Khalti movie id or BookMyShow event code
    pub movie_id: String,
    pub venue: String,
    /// Khalti show id or BookMyShow session id
    pub show_id: String,
}

impl ShowIdentity {
    pub fn new(movie_id: impl Into<String>, venue: impl Into<String>, show_id: impl Into<String>) -> Self {
        Self {
            movie_id: movie_id.into(),
            venue: venue.into(),
            show_id: show_id.into(),
        }
    }
}

impl std::fmt::Display for ShowIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.movie_id, self.venue, self.show_id)
    }
}

/// Seat and ticket counts of one show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketTotals {
    pub seats: u64,
    pub sold: u64,
    pub reserved: u64,
    pub available: u64,
    pub gross: f64,
}

impl TicketTotals {
    pub fn occupied(&self) -> u64 {
        self.sold + self.reserved
    }

    /// `round(100 * (sold + reserved) / seats, 2)`, 0 when there are no seats.
    pub fn occupancy_percent(&self) -> f64 {
        if self.seats == 0 {
            return 0.0;
        }
        round2(100.0 * self.occupied() as f64 / self.seats as f64)
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Id-like text that older files wrote as a number or `null`.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// The durable unit of truth written to the Detailed file.
///
/// Aliases and lenient ids also accept Detailed files from earlier trackers
/// (`eventCode`/`sessionId` keys, integer movie ids, null venues).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    #[serde(alias = "eventCode", deserialize_with = "lenient_text")]
    pub movie_id: String,
    #[serde(default, alias = "movie", deserialize_with = "lenient_text")]
    pub movie_name: String,
    #[serde(alias = "sessionId", deserialize_with = "lenient_text")]
    pub show_id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theatre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Release date of the event variant, when the source lists one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    pub date: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(alias = "totalSeats")]
    pub seats: u64,
    pub sold: u64,
    #[serde(default)]
    pub reserved: u64,
    pub available: u64,
    pub gross: f64,
    #[serde(alias = "occupancy")]
    pub occupancy_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mins_left: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, rename = "badData", skip_serializing_if = "std::ops::Not::not")]
    pub bad_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NormalizedRow {
    /// Builds a row from its identity and totals; occupancy is derived here and nowhere else.
    pub fn from_totals(identity: &ShowIdentity, movie_name: impl Into<String>, date: impl Into<String>, totals: TicketTotals) -> Self {
        Self {
            movie_id: identity.movie_id.clone(),
            movie_name: movie_name.into(),
            show_id: identity.show_id.clone(),
            venue: identity.venue.clone(),
            theatre: None,
            format: None,
            language: None,
            release: None,
            date: date.into(),
            time: None,
            seats: totals.seats,
            sold: totals.sold,
            reserved: totals.reserved,
            available: totals.available,
            gross: totals.gross,
            occupancy_percent: totals.occupancy_percent(),
            mins_left: None,
            skipped: false,
            bad_data: false,
            error: None,
        }
    }

    /// A zeroed row flagged as skipped, carrying the failure text.
    pub fn skipped(identity: &ShowIdentity, movie_name: impl Into<String>, date: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut row = Self::from_totals(identity, movie_name, date, TicketTotals::default());
        row.skipped = true;
        row.error = Some(reason.into());
        row
    }

    pub fn identity(&self) -> ShowIdentity {
        ShowIdentity::new(self.movie_id.clone(), self.venue.clone(), self.show_id.clone())
    }

    pub fn totals(&self) -> TicketTotals {
        TicketTotals {
            seats: self.seats,
            sold: self.sold,
            reserved: self.reserved,
            available: self.available,
            gross: self.gross,
        }
    }
}

/// Result of extracting one show. Failures stay in-band until persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Ok(NormalizedRow),
    Skipped {
        identity: ShowIdentity,
        movie_name: String,
        date: String,
        reason: String,
    },
}

impl RowOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RowOutcome::Skipped { .. })
    }

    pub fn identity(&self) -> ShowIdentity {
        match self {
            RowOutcome::Ok(row) => row.identity(),
            RowOutcome::Skipped { identity, .. } => identity.clone(),
        }
    }

    /// Converts into the persisted representation, flagging skipped shows.
    pub fn into_row(self) -> NormalizedRow {
        match self {
            RowOutcome::Ok(row) => row,
            RowOutcome::Skipped {
                identity,
                movie_name,
                date,
                reason,
            } => NormalizedRow::skipped(&identity, movie_name, date, reason),
        }
    }
}
