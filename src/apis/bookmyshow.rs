//! BookMyShow PWA API (Sri Lanka).
//!
//! The movie list comes in more than one envelope shape, so it is matched
//! against an ordered list of shapes. Each parent movie expands into one
//! variant per child event (format/language), and showtimes are fetched per
//! variant and date code.

use crate::app::ports::HttpRequest;
use crate::config::SriLankaConfig;
use crate::error::Result;
use crate::pipeline::extract::{categories, key_string, MovieContext};
use crate::pipeline::fetcher::RetryingFetcher;
use crate::pipeline::scheduler::JobOutcome;
use crate::types::RowOutcome;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

/// One bookable format/language of a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventVariant {
    pub title: String,
    pub event_code: String,
    pub format: Option<String>,
    pub language: Option<String>,
    pub release: Option<String>,
}

impl EventVariant {
    pub fn context(&self) -> MovieContext {
        MovieContext {
            movie_id: self.event_code.clone(),
            movie_name: self.title.clone(),
            format: self.format.clone(),
            language: self.language.clone(),
            release: self.release.clone(),
        }
    }

    /// `Title (Format)` used in progress logs.
    pub fn label(&self) -> String {
        format!("{} ({})", self.title, self.format.as_deref().unwrap_or("Standard"))
    }
}

type ShapeMatcher = fn(&Value) -> Option<&Vec<Value>>;

fn now_showing_events(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("nowShowing")?.get("arrEvents")?.as_array()
}

fn top_level_events(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("arrEvents")?.as_array()
}

fn legacy_movies(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("movies")?.as_array()
}

/// Known movie-list envelopes, most specific first.
const MOVIE_LIST_SHAPES: [(&str, ShapeMatcher); 3] = [
    ("nowShowing.arrEvents", now_showing_events),
    ("arrEvents", top_level_events),
    ("movies", legacy_movies),
];

/// Parent movie entries from whichever envelope matches first.
pub fn extract_movies(raw: &Value) -> Vec<Value> {
    for (shape, matcher) in MOVIE_LIST_SHAPES.iter() {
        if let Some(movies) = matcher(raw) {
            debug!("Movie list matched shape {}", shape);
            return movies.clone();
        }
    }
    debug!("Movie list matched no known shape");
    Vec::new()
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .filter(|v| !v.is_null())
        .map(key_string)
        .filter(|s| !s.is_empty())
}

/// Expands parents into their `ChildEvents`. Parents without children give nothing.
pub fn expand_variants(parents: &[Value]) -> Vec<EventVariant> {
    let mut variants = Vec::new();
    for parent in parents {
        let title = non_empty_string(parent.get("EventTitle")).unwrap_or_default();
        let children = parent.get("ChildEvents").and_then(Value::as_array);
        for child in children.into_iter().flatten() {
            let Some(event_code) = non_empty_string(child.get("EventCode")) else {
                continue;
            };
            variants.push(EventVariant {
                title: title.clone(),
                event_code,
                format: non_empty_string(child.get("EventDimension")),
                language: non_empty_string(child.get("EventLanguage")),
                release: non_empty_string(child.get("EventDate")),
            });
        }
    }
    variants
}

/// Venues listed under `BookMyShow.ShowDetails[]` for `date_code`.
pub fn extract_venues(raw: &Value, date_code: &str) -> Vec<Value> {
    raw.get("BookMyShow")
        .and_then(|b| b.get("ShowDetails"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|detail| detail.get("Date").map(key_string).as_deref() == Some(date_code))
        .and_then(|detail| detail.get("Venues"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Flattens every venue's `ShowTimes[]` into rows.
pub fn flatten_venues(venues: &[Value], variant: &EventVariant, date_code: &str, config: &SriLankaConfig) -> Vec<RowOutcome> {
    let context = variant.context();
    venues
        .iter()
        .flat_map(|venue| {
            let name = non_empty_string(venue.get("VenueName")).unwrap_or_default();
            let shows = venue.get("ShowTimes").and_then(Value::as_array).cloned().unwrap_or_default();
            shows
                .into_iter()
                .map(|show| categories::extract(&show, &name, &context, date_code, config.price_unit))
                .collect::<Vec<_>>()
        })
        .collect()
}

pub struct BookMyShowClient {
    fetcher: RetryingFetcher,
    config: SriLankaConfig,
}

impl BookMyShowClient {
    pub fn new(fetcher: RetryingFetcher, config: SriLankaConfig) -> Self {
        Self { fetcher, config }
    }

    /// Every event variant currently listed.
    #[instrument(skip(self))]
    pub async fn fetch_variants(&self) -> Result<Vec<EventVariant>> {
        let request = HttpRequest::post_json(
            self.config.movies_url.clone(),
            json!({ "regionCode": self.config.region_code, "page": 1, "limit": 200, "filters": {} }),
        );
        let raw: Value = self.fetcher.fetch_json(&request).await?;
        let parents = extract_movies(&raw);
        let variants = expand_variants(&parents);
        info!("{} movies expanded into {} event variants", parents.len(), variants.len());
        Ok(variants)
    }

    /// Rows of one variant on `date_code`. A failed fetch or an empty venue
    /// list is "not ok" so the variant is tried again next pass.
    pub async fn fetch_event_rows(&self, variant: &EventVariant, date_code: &str) -> JobOutcome<Vec<RowOutcome>> {
        let url = format!(
            "{}?regionCode={}&eventCode={}&dateCode={}",
            self.config.showtimes_url, self.config.region_code, variant.event_code, date_code
        );
        let raw: Value = match self.fetcher.fetch_json(&HttpRequest::get(url)).await {
            Ok(raw) => raw,
            Err(e) => {
                return JobOutcome::NotOk {
                    reason: format!("{}: {}", variant.label(), e),
                }
            }
        };
        let venues = extract_venues(&raw, date_code);
        if venues.is_empty() {
            return JobOutcome::NotOk {
                reason: format!("{}: no venues on {}", variant.label(), date_code),
            };
        }
        JobOutcome::Ok(flatten_venues(&venues, variant, date_code, &self.config))
    }
}
