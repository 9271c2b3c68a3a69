//! Summaries derived from the merged dataset.
//!
//! Nothing here is persisted incrementally: every run recomputes the
//! summaries from the full row set.

use crate::constants::{FAST_FILLING_PERCENT, HOUSEFULL_PERCENT};
use crate::types::{round2, NormalizedRow};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyBand {
    Housefull,
    FastFilling,
    Normal,
}

impl OccupancyBand {
    pub fn of(occupancy_percent: f64) -> Self {
        if occupancy_percent >= HOUSEFULL_PERCENT {
            OccupancyBand::Housefull
        } else if occupancy_percent >= FAST_FILLING_PERCENT {
            OccupancyBand::FastFilling
        } else {
            OccupancyBand::Normal
        }
    }
}

/// Counters shared by every summary level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShowTotals {
    pub total_shows: u64,
    pub seats: u64,
    pub sold: u64,
    pub reserved: u64,
    pub available: u64,
    pub gross: f64,
    pub housefull: u64,
    pub fastfilling: u64,
}

impl ShowTotals {
    fn add(&mut self, row: &NormalizedRow) {
        self.total_shows += 1;
        self.seats += row.seats;
        self.sold += row.sold;
        self.reserved += row.reserved;
        self.available += row.available;
        self.gross += row.gross;
        match OccupancyBand::of(row.occupancy_percent) {
            OccupancyBand::Housefull => self.housefull += 1,
            OccupancyBand::FastFilling => self.fastfilling += 1,
            OccupancyBand::Normal => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueSummary {
    pub venue: String,
    #[serde(flatten)]
    pub totals: ShowTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieSummary {
    pub movie_id: String,
    pub movie_name: String,
    #[serde(flatten)]
    pub totals: ShowTotals,
    /// Sorted by venue name
    pub venues: Vec<VenueSummary>,
}

/// Movie totals with a nested per-venue breakdown, ordered by movie id.
pub fn summarize_by_venue<'a>(rows: impl IntoIterator<Item = &'a NormalizedRow>) -> Vec<MovieSummary> {
    let mut movies: BTreeMap<String, (String, ShowTotals, BTreeMap<String, ShowTotals>)> = BTreeMap::new();

    for row in rows {
        let venue = if row.venue.is_empty() { "Unknown" } else { row.venue.as_str() };
        let (_, movie_totals, venues) = movies
            .entry(row.movie_id.clone())
            .or_insert_with(|| (row.movie_name.clone(), ShowTotals::default(), BTreeMap::new()));
        movie_totals.add(row);
        venues.entry(venue.to_string()).or_default().add(row);
    }

    movies
        .into_iter()
        .map(|(movie_id, (movie_name, totals, venues))| MovieSummary {
            movie_id,
            movie_name,
            totals,
            venues: venues
                .into_iter()
                .map(|(venue, totals)| VenueSummary { venue, totals })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatSummary {
    pub format: Option<String>,
    pub language: Option<String>,
    pub shows: u64,
    pub gross: f64,
    pub sold: u64,
    pub total_seats: u64,
    #[serde(rename = "fastfilling")]
    pub fast_filling: u64,
    pub housefull: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleSummary {
    pub total_shows: u64,
    pub total_gross: f64,
    pub total_sold: u64,
    pub total_seats: u64,
    /// `round(100 * sold / seats, 2)`, 0 without seats
    pub global_occupancy: f64,
    /// Keyed by event code
    pub formats: BTreeMap<String, FormatSummary>,
}

/// Title totals with a nested per-format (event code) breakdown.
pub fn summarize_by_format<'a>(rows: impl IntoIterator<Item = &'a NormalizedRow>) -> BTreeMap<String, TitleSummary> {
    let mut titles: BTreeMap<String, TitleSummary> = BTreeMap::new();

    for row in rows {
        let title = titles.entry(row.movie_name.clone()).or_default();
        let format = title.formats.entry(row.movie_id.clone()).or_insert_with(|| FormatSummary {
            format: row.format.clone(),
            language: row.language.clone(),
            ..FormatSummary::default()
        });

        format.shows += 1;
        format.gross += row.gross;
        format.sold += row.sold;
        format.total_seats += row.seats;
        match OccupancyBand::of(row.occupancy_percent) {
            OccupancyBand::Housefull => format.housefull += 1,
            OccupancyBand::FastFilling => format.fast_filling += 1,
            OccupancyBand::Normal => {}
        }

        title.total_shows += 1;
        title.total_gross += row.gross;
        title.total_sold += row.sold;
        title.total_seats += row.seats;
    }

    for title in titles.values_mut() {
        title.global_occupancy = if title.total_seats == 0 {
            0.0
        } else {
            round2(100.0 * title.total_sold as f64 / title.total_seats as f64)
        };
    }
    titles
}
