//! Which shows a run looks at: wall-clock helpers, tracking dates and the
//! minutes-until-showtime cutoff.

use crate::constants::{IST_OFFSET_SECS, JST_OFFSET_SECS, LAST_UPDATED_FORMAT};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// `hh:mm AM, dd Month yyyy` stamp written into every artifact.
pub fn last_updated(now: &DateTime<FixedOffset>) -> String {
    now.format(LAST_UPDATED_FORMAT).to_string()
}

/// `YYYYMMDD`, the BookMyShow date code.
pub fn date_code(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Date an advance run tracks: the floor date until it is reached, then
/// `offset_days` after today.
pub fn advance_tracking_date(today: NaiveDate, floor: Option<NaiveDate>, offset_days: i64) -> NaiveDate {
    match floor {
        Some(floor) if today < floor => floor,
        _ => today + Duration::days(offset_days),
    }
}

/// Whole minutes from `now` until `start`, truncated toward zero.
pub fn minutes_until(start: &DateTime<FixedOffset>, now: &DateTime<FixedOffset>) -> i64 {
    (*start - *now).num_seconds() / 60
}

/// Khalti show datetimes look like `2025-12-09 12:00:00` (IST).
pub fn parse_khalti_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    ist().from_local_datetime(&naive).single()
}

/// BookMyShow gives a date code plus `06:30 PM` or `18:30` (IST).
pub fn parse_bms_showtime(date_code: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    let combined = format!("{} {}", date_code.trim(), time.trim());
    ["%Y%m%d %I:%M %p", "%Y%m%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&combined, fmt).ok())
        .and_then(|naive| ist().from_local_datetime(&naive).single())
}

/// Candidate filter applied before any show is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowWindow {
    /// Starts between now and `minutes` from now, inclusive
    StartingWithin { minutes: i64 },
    /// Starts on this calendar date
    OnDate(NaiveDate),
}

impl ShowWindow {
    /// Unparseable datetimes never match a cutoff window.
    pub fn admits(&self, datetime: &str, now: &DateTime<FixedOffset>) -> bool {
        match self {
            ShowWindow::StartingWithin { minutes } => match parse_khalti_datetime(datetime) {
                Some(start) => (0..=*minutes).contains(&minutes_until(&start, now)),
                None => false,
            },
            ShowWindow::OnDate(date) => {
                let wanted = date.format("%Y-%m-%d").to_string();
                datetime.split(' ').next() == Some(wanted.as_str())
            }
        }
    }
}

/// Cutoff check for a fetched BookMyShow row. Returns whether to keep the
/// row and, when the time parsed, the minutes left. Unparseable times are kept.
pub fn bms_cutoff(date_code: &str, time: Option<&str>, cutoff_minutes: i64, now: &DateTime<FixedOffset>) -> (bool, Option<i64>) {
    match time.and_then(|t| parse_bms_showtime(date_code, t)) {
        Some(start) => {
            let mins_left = minutes_until(&start, now);
            (mins_left < cutoff_minutes, Some(mins_left))
        }
        None => (true, None),
    }
}

/// Every date from `start` through `end`, inclusive.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}
