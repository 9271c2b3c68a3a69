use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::apis::bookmyshow::BookMyShowClient;
use crate::apis::khalti::{KhaltiClient, MovieRef, ShowRef};
use crate::apis::mimorin::{days_to_fetch, MimorinClient};
use crate::app::ports::Transport;
use crate::config::Config;
use crate::constants;
use crate::pipeline::aggregate::{summarize_by_format, summarize_by_venue};
use crate::pipeline::clock::Clock;
use crate::pipeline::cooldown::CooldownGovernor;
use crate::pipeline::fetcher::{RetryPolicy, RetryingFetcher};
use crate::pipeline::merge_store::{persist, MergedDataset};
use crate::pipeline::scheduler::{run_all, run_passes};
use crate::pipeline::window::{self, ShowWindow};
use crate::types::{NormalizedRow, RowOutcome};

/// Which date a ticketing run tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TrackingMode {
    /// Today's shows, restricted to the cutoff window
    Daily,
    /// Shows on an upcoming date
    Advance,
}

/// Per-run inputs that are not configuration.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: TrackingMode,
    /// Replaces the computed tracking date
    pub date: Option<NaiveDate>,
    /// Wall-clock reference for windows and stamps
    pub now: DateTime<FixedOffset>,
}

impl RunRequest {
    pub fn new(mode: TrackingMode, now: DateTime<FixedOffset>) -> Self {
        Self { mode, date: None, now }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub source: String,
    pub date_label: String,
    /// Shows, event variants or days selected for fetching
    pub candidates: usize,
    /// Rows (or day files) produced this run
    pub fetched: usize,
    /// Rows held in the Detailed file after the merge
    pub stored: usize,
    pub added: usize,
    pub auto_corrected: usize,
    pub skipped: usize,
    pub summary_path: Option<PathBuf>,
    pub detailed_path: Option<PathBuf>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "================================================")?;
        writeln!(f, "📊 {} run for {}", self.source, self.date_label)?;
        writeln!(f, "   Candidates: {}", self.candidates)?;
        writeln!(f, "   Fetched this run: {}", self.fetched)?;
        writeln!(f, "   Stored: {}", self.stored)?;
        writeln!(f, "   Newly added: {}", self.added)?;
        if self.skipped > 0 {
            writeln!(f, "   Skipped: {}", self.skipped)?;
        }
        if self.auto_corrected > 0 {
            writeln!(f, "   Auto-corrected: {}", self.auto_corrected)?;
        }
        if let Some(path) = &self.summary_path {
            writeln!(f, "📁 Summary  → {}", path.display())?;
        }
        if let Some(path) = &self.detailed_path {
            writeln!(f, "📁 Detailed → {}", path.display())?;
        }
        write!(f, "================================================")
    }
}

/// Orchestrates one harvesting run per source: select, fetch, merge, summarize, persist.
pub struct HarvestUseCase {
    config: Config,
    clock: Arc<dyn Clock>,
}

impl HarvestUseCase {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// One cooldown governor per run, shared by every worker of that run.
    fn fetcher(&self, transport: Arc<dyn Transport>, policy: RetryPolicy) -> RetryingFetcher {
        let governor = Arc::new(CooldownGovernor::new(self.config.harvest.cooldown(), self.clock.clone()));
        RetryingFetcher::new(transport, governor, self.clock.clone(), policy)
    }

    fn output_paths(&self, folder: &Path, date_label: &str) -> (PathBuf, PathBuf) {
        let dir = self.config.output_root.join(folder);
        (
            dir.join(format!("{}_Summary.json", date_label)),
            dir.join(format!("{}_Detailed.json", date_label)),
        )
    }

    #[instrument(skip(self, transport, request), fields(source = constants::NEPAL_SOURCE, mode = ?request.mode))]
    pub async fn run_nepal(&self, transport: Arc<dyn Transport>, request: &RunRequest) -> Result<RunReport> {
        let nepal = &self.config.nepal;
        let today = request.now.date_naive();
        let (window, date, folder) = match request.mode {
            // an explicit date cannot use the minutes-from-now window
            TrackingMode::Daily => match request.date {
                Some(date) => (ShowWindow::OnDate(date), date, constants::NEPAL_DAILY_DIR),
                None => (
                    ShowWindow::StartingWithin {
                        minutes: nepal.cutoff_minutes,
                    },
                    today,
                    constants::NEPAL_DAILY_DIR,
                ),
            },
            TrackingMode::Advance => {
                let date = request.date.unwrap_or_else(|| {
                    window::advance_tracking_date(today, nepal.advance_floor_date, nepal.advance_offset_days)
                });
                (ShowWindow::OnDate(date), date, constants::NEPAL_ADVANCE_DIR)
            }
        };
        let date_label = date.format("%Y-%m-%d").to_string();
        let (summary_path, detailed_path) = self.output_paths(Path::new(folder), &date_label);
        info!("🚀 Nepal {:?} tracking {}", request.mode, date_label);

        let mut dataset = MergedDataset::load(&detailed_path);

        let fetcher = self.fetcher(transport, self.config.harvest.retry_policy());
        let client = Arc::new(
            KhaltiClient::connect(fetcher, nepal.clone())
                .await
                .context("Failed to fetch Khalti token")?,
        );
        let movies = client
            .fetch_movie_list()
            .await
            .context("Failed to fetch Khalti movie list")?;

        let mut candidates = 0;
        let mut fresh: Vec<RowOutcome> = Vec::new();
        for movie in movies {
            let shows = client.candidate_shows(&movie, &window, &request.now).await;
            info!("🎯 {} → {} shows in window", movie.name, shows.len());
            if shows.is_empty() {
                continue;
            }
            candidates += shows.len();

            let client = Arc::clone(&client);
            let movie = Arc::new(movie);
            let fallback_date = date_label.clone();
            let label = movie.name.clone();
            let rows = run_all(&label, shows, self.config.harvest.max_workers, move |show: ShowRef| {
                let client = Arc::clone(&client);
                let movie: Arc<MovieRef> = Arc::clone(&movie);
                let fallback_date = fallback_date.clone();
                async move { client.fetch_show(&movie, &show, &fallback_date).await }
            })
            .await;
            fresh.extend(rows);
        }
        info!("🆕 Newly fetched this run: {}", fresh.len());

        let fetched = fresh.len();
        let skipped = fresh.iter().filter(|r| r.is_skipped()).count();
        let stats = dataset.merge(fresh.into_iter().map(RowOutcome::into_row));
        info!("📦 Stored shows: {} ({} added, {} replaced)", dataset.len(), stats.added, stats.replaced);

        let stamp = window::last_updated(&request.now);
        persist(&detailed_path, &dataset.to_detailed(&date_label, &stamp, false))?;
        persist(&summary_path, &summarize_by_venue(dataset.rows()))?;

        Ok(RunReport {
            source: constants::NEPAL_SOURCE.to_string(),
            date_label,
            candidates,
            fetched,
            stored: dataset.len(),
            added: stats.added,
            auto_corrected: dataset.bad_data_count(),
            skipped,
            summary_path: Some(summary_path),
            detailed_path: Some(detailed_path),
        })
    }

    #[instrument(skip(self, transport, request), fields(source = constants::SRILANKA_SOURCE, mode = ?request.mode))]
    pub async fn run_srilanka(&self, transport: Arc<dyn Transport>, request: &RunRequest) -> Result<RunReport> {
        let lanka = &self.config.srilanka;
        let today = request.now.date_naive();
        let (date, passes, folder) = match request.mode {
            TrackingMode::Daily => {
                let date = request.date.unwrap_or(today);
                (
                    date,
                    lanka.daily_passes,
                    Path::new(constants::SRILANKA_DAILY_DIR).join(date.format("%Y").to_string()),
                )
            }
            TrackingMode::Advance => (
                request.date.unwrap_or(today + Duration::days(1)),
                lanka.advance_passes,
                PathBuf::from(constants::SRILANKA_ADVANCE_DIR),
            ),
        };
        let date_code = window::date_code(date);
        let (summary_path, detailed_path) = self.output_paths(&folder, &date_code);
        info!("🚀 Sri Lanka {:?} tracking {}", request.mode, date_code);

        let mut dataset = MergedDataset::load(&detailed_path);

        let fetcher = self.fetcher(transport, lanka.retry_policy());
        let client = Arc::new(BookMyShowClient::new(fetcher, lanka.clone()));
        let variants = client
            .fetch_variants()
            .await
            .context("Failed to fetch BookMyShow movie list")?;
        let candidates = variants.len();

        let job_client = Arc::clone(&client);
        let job_date = date_code.clone();
        let report = run_passes("srilanka", variants, passes, lanka.max_workers, move |variant| {
            let client = Arc::clone(&job_client);
            let date_code = job_date.clone();
            async move { client.fetch_event_rows(&variant, &date_code).await }
        })
        .await;
        if !report.pending.is_empty() {
            warn!("{} event variants returned no venues after {} passes", report.pending.len(), report.passes_run);
        }

        let fresh: Vec<RowOutcome> = report.completed.into_iter().flatten().collect();
        let fetched = fresh.len();
        let skipped = fresh.iter().filter(|r| r.is_skipped()).count();
        let mut rows: Vec<NormalizedRow> = fresh.into_iter().map(RowOutcome::into_row).collect();
        if request.mode == TrackingMode::Daily {
            rows = apply_cutoff(rows, &date_code, lanka.cutoff_minutes, &request.now);
        }
        info!("✅ Eligible new rows: {}", rows.len());

        let stats = dataset.merge(rows);
        info!("📦 Stored shows: {} ({} added, {} replaced)", dataset.len(), stats.added, stats.replaced);

        let stamp = window::last_updated(&request.now);
        let detailed = dataset.to_detailed(&date_code, &stamp, true);
        persist(&detailed_path, &detailed)?;
        persist(
            &summary_path,
            &serde_json::json!({
                "date": date_code,
                "lastUpdated": stamp,
                "movies": summarize_by_format(dataset.rows()),
            }),
        )?;

        Ok(RunReport {
            source: constants::SRILANKA_SOURCE.to_string(),
            date_label: date_code,
            candidates,
            fetched,
            stored: dataset.len(),
            added: stats.added,
            auto_corrected: detailed.auto_corrected.unwrap_or_default(),
            skipped,
            summary_path: Some(summary_path),
            detailed_path: Some(detailed_path),
        })
    }

    #[instrument(skip(self, transport, request), fields(source = constants::JAPAN_SOURCE))]
    pub async fn run_japan(&self, transport: Arc<dyn Transport>, request: &RunRequest) -> Result<RunReport> {
        let japan = &self.config.japan;
        let root = self.config.output_root.join(constants::JAPAN_DIR);
        let today = request.now.with_timezone(&window::jst()).date_naive();
        let days = match request.date {
            Some(date) => vec![date],
            None => {
                let start = NaiveDate::from_ymd_opt(japan.start_year, 1, 1)
                    .with_context(|| format!("Invalid start year {}", japan.start_year))?;
                days_to_fetch(&root, start, today)
            }
        };
        info!("📅 Days to fetch: {}", days.len());
        let candidates = days.len();

        let client = Arc::new(MimorinClient::new(self.fetcher(transport, japan.retry_policy()), japan.clone()));
        let job_root = Arc::new(root);
        let results = run_all("japan", days, japan.max_workers, move |day: NaiveDate| {
            let client = Arc::clone(&client);
            let root = Arc::clone(&job_root);
            async move { (day, client.archive_day(&root, day).await) }
        })
        .await;

        let mut written = 0;
        let mut failed = 0;
        for (day, result) in results {
            match result {
                Ok(Some(_)) => written += 1,
                Ok(None) => {}
                Err(e) => {
                    failed += 1;
                    warn!(day = %day, error = %e, "Day archive failed");
                }
            }
        }
        info!("✔ {} day files written", written);

        Ok(RunReport {
            source: constants::JAPAN_SOURCE.to_string(),
            date_label: today.format("%Y-%m-%d").to_string(),
            candidates,
            fetched: written,
            stored: written,
            added: written,
            auto_corrected: 0,
            skipped: failed,
            summary_path: None,
            detailed_path: None,
        })
    }
}

/// Keeps fresh BookMyShow rows starting within the cutoff and records their
/// minutes left. Rows without a parseable time are kept.
pub fn apply_cutoff(
    rows: Vec<NormalizedRow>,
    date_code: &str,
    cutoff_minutes: i64,
    now: &DateTime<FixedOffset>,
) -> Vec<NormalizedRow> {
    rows.into_iter()
        .filter_map(|mut row| {
            let (keep, mins_left) = window::bms_cutoff(date_code, row.time.as_deref(), cutoff_minutes, now);
            row.mins_left = mins_left;
            keep.then_some(row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ShowIdentity, TicketTotals};

    fn row_at(time: Option<&str>) -> NormalizedRow {
        let mut row = NormalizedRow::from_totals(
            &ShowIdentity::new("ET1", "Scope", time.unwrap_or("none")),
            "Film",
            "20251209",
            TicketTotals::default(),
        );
        row.time = time.map(str::to_string);
        row
    }

    #[test]
    fn cutoff_drops_late_shows_and_records_minutes() {
        let now = window::parse_khalti_datetime("2025-12-09 17:00:00").unwrap();
        let rows = vec![row_at(Some("06:00 PM")), row_at(Some("11:30 PM")), row_at(None)];
        let kept = apply_cutoff(rows, "20251209", 200, &now);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].mins_left, Some(60));
        assert_eq!(kept[1].mins_left, None);
    }

    #[test]
    fn report_renders_paths() {
        let report = RunReport {
            source: "nepal".to_string(),
            date_label: "2025-12-09".to_string(),
            stored: 3,
            summary_path: Some(PathBuf::from("out/2025-12-09_Summary.json")),
            ..RunReport::default()
        };
        let text = report.to_string();
        assert!(text.contains("nepal run for 2025-12-09"));
        assert!(text.contains("Stored: 3"));
        assert!(text.contains("2025-12-09_Summary.json"));
        assert!(!text.contains("Detailed"));
    }
}
