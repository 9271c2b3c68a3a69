use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use boxoffice_tracker::app::ports::Transport;
use boxoffice_tracker::app::{HarvestUseCase, RunRequest, TrackingMode};
use boxoffice_tracker::config::Config;
use boxoffice_tracker::constants;
use boxoffice_tracker::infra::{IdentityProfile, ReqwestTransport};
use boxoffice_tracker::logging;
use boxoffice_tracker::observability::{init_metrics, push_to_gateway, render};
use boxoffice_tracker::pipeline::clock::{Clock, SystemClock};
use boxoffice_tracker::pipeline::window;

#[derive(Parser)]
#[command(name = "boxoffice_tracker")]
#[command(about = "Harvests seat and sales data from ticketing sources into cumulative JSON files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to boxoffice.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder for all output files
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// Track this date instead of the computed one (YYYY-MM-DD)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    /// Minutes-until-showtime cutoff for daily runs
    #[arg(long, global = true)]
    cutoff_minutes: Option<i64>,

    /// Worker pool size
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Maximum scraping passes (Sri Lanka)
    #[arg(long, global = true)]
    passes: Option<usize>,

    /// Write the Prometheus text exposition here after the run
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Khalti seat maps (Nepal)
    Nepal {
        #[arg(long, value_enum, default_value_t = TrackingMode::Daily)]
        mode: TrackingMode,
    },
    /// BookMyShow showtimes (Sri Lanka)
    Srilanka {
        #[arg(long, value_enum, default_value_t = TrackingMode::Daily)]
        mode: TrackingMode,
    },
    /// Box-office blog archive (Japan)
    Japan,
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(out_dir) = &cli.out_dir {
        config.output_root = out_dir.clone();
    }
    if let Some(minutes) = cli.cutoff_minutes {
        config.nepal.cutoff_minutes = minutes;
        config.srilanka.cutoff_minutes = minutes;
    }
    if let Some(workers) = cli.workers.filter(|w| *w > 0) {
        config.harvest.max_workers = workers;
        config.srilanka.max_workers = workers;
        config.japan.max_workers = workers;
    }
    if let Some(passes) = cli.passes.filter(|p| *p > 0) {
        config.srilanka.daily_passes = passes;
        config.srilanka.advance_passes = passes;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);

    logging::init_logging(&config.log_dir);
    init_metrics();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let use_case = HarvestUseCase::new(config.clone(), clock);
    let now = window::now_in(window::ist());
    let request = |mode: TrackingMode| RunRequest {
        mode,
        date: cli.date,
        now,
    };

    let (source, report) = match cli.command {
        Commands::Nepal { mode } => {
            let transport: Arc<dyn Transport> =
                Arc::new(ReqwestTransport::new(config.harvest.timeout(), IdentityProfile::KhaltiMobile)?);
            (constants::NEPAL_SOURCE, use_case.run_nepal(transport, &request(mode)).await?)
        }
        Commands::Srilanka { mode } => {
            let timeout = std::time::Duration::from_secs(config.srilanka.timeout_secs);
            let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(timeout, IdentityProfile::BookMyShow)?);
            (constants::SRILANKA_SOURCE, use_case.run_srilanka(transport, &request(mode)).await?)
        }
        Commands::Japan => {
            let timeout = std::time::Duration::from_secs(config.japan.timeout_secs);
            let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(timeout, IdentityProfile::Plain)?);
            (
                constants::JAPAN_SOURCE,
                use_case.run_japan(transport, &request(TrackingMode::Daily)).await?,
            )
        }
    };

    println!("{}", report);
    info!("Run finished for {}", source);

    if let Some(path) = &cli.metrics_out {
        if let Some(text) = render() {
            std::fs::write(path, text).with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        }
    }
    if let Ok(url) = std::env::var("BOXOFFICE_PUSHGATEWAY_URL") {
        if let Err(e) = push_to_gateway(&url, "boxoffice_tracker", source).await {
            warn!("Failed to push metrics: {}", e);
        }
    }
    Ok(())
}
