//! Metrics for the harvesting pipeline
//!
//! Every phase records through the small helper modules at the bottom of this
//! file so metric names live in one place. Recording is a no-op until
//! [`init_metrics`] installs the Prometheus recorder.

use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// All metric names used by the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Fetch metrics
    FetchRequestsSuccess,
    FetchRequestsError,
    FetchRequestDuration,
    FetchRetries,
    FetchRateLimited,

    // Cooldown metrics
    CooldownActivations,

    // Scheduler metrics
    SchedulerJobsOk,
    SchedulerJobsNotOk,
    SchedulerPasses,

    // Extract metrics
    ExtractRowsSkipped,
    ExtractRowsBadData,

    // Store metrics
    StoreRowsLoaded,
    StoreRowsAdded,
    StoreRowsReplaced,
    StoreCorruptFiles,
    StoreRowsUndecodable,
    StoreWrites,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FetchRequestsSuccess => "boxoffice_fetch_requests_success_total",
            MetricName::FetchRequestsError => "boxoffice_fetch_requests_error_total",
            MetricName::FetchRequestDuration => "boxoffice_fetch_request_duration_seconds",
            MetricName::FetchRetries => "boxoffice_fetch_retries_total",
            MetricName::FetchRateLimited => "boxoffice_fetch_rate_limited_total",

            MetricName::CooldownActivations => "boxoffice_cooldown_activations_total",

            MetricName::SchedulerJobsOk => "boxoffice_scheduler_jobs_ok_total",
            MetricName::SchedulerJobsNotOk => "boxoffice_scheduler_jobs_not_ok_total",
            MetricName::SchedulerPasses => "boxoffice_scheduler_passes_total",

            MetricName::ExtractRowsSkipped => "boxoffice_extract_rows_skipped_total",
            MetricName::ExtractRowsBadData => "boxoffice_extract_rows_bad_data_total",

            MetricName::StoreRowsLoaded => "boxoffice_store_rows_loaded_total",
            MetricName::StoreRowsAdded => "boxoffice_store_rows_added_total",
            MetricName::StoreRowsReplaced => "boxoffice_store_rows_replaced_total",
            MetricName::StoreCorruptFiles => "boxoffice_store_corrupt_files_total",
            MetricName::StoreRowsUndecodable => "boxoffice_store_rows_undecodable_total",
            MetricName::StoreWrites => "boxoffice_store_writes_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder once. Later calls are no-ops.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_ok() {
                info!("Prometheus recorder installed");
            }
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Text exposition of everything recorded so far, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

/// Pushes the rendered metrics to a Prometheus Pushgateway.
pub async fn push_to_gateway(pushgateway_url: &str, job: &str, instance: &str) -> anyhow::Result<()> {
    let Some(body) = render() else {
        return Ok(());
    };
    let push_url = format!(
        "{}/metrics/job/{}/instance/{}",
        pushgateway_url.trim_end_matches('/'),
        job,
        instance
    );
    let response = reqwest::Client::new()
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        anyhow::bail!("Pushgateway returned status {}", status);
    }
    info!("Pushed metrics to Pushgateway for instance={}", instance);
    Ok(())
}

pub mod fetch {
    use super::MetricName;

    pub fn request_success(duration_secs: f64) {
        ::metrics::counter!(MetricName::FetchRequestsSuccess.as_str()).increment(1);
        ::metrics::histogram!(MetricName::FetchRequestDuration.as_str()).record(duration_secs);
    }

    pub fn request_error() {
        ::metrics::counter!(MetricName::FetchRequestsError.as_str()).increment(1);
    }

    pub fn retry() {
        ::metrics::counter!(MetricName::FetchRetries.as_str()).increment(1);
    }

    pub fn rate_limited() {
        ::metrics::counter!(MetricName::FetchRateLimited.as_str()).increment(1);
    }
}

pub mod cooldown {
    use super::MetricName;

    pub fn activated() {
        ::metrics::counter!(MetricName::CooldownActivations.as_str()).increment(1);
    }
}

pub mod scheduler {
    use super::MetricName;

    pub fn job_ok() {
        ::metrics::counter!(MetricName::SchedulerJobsOk.as_str()).increment(1);
    }

    pub fn job_not_ok() {
        ::metrics::counter!(MetricName::SchedulerJobsNotOk.as_str()).increment(1);
    }

    pub fn pass_started() {
        ::metrics::counter!(MetricName::SchedulerPasses.as_str()).increment(1);
    }
}

pub mod extract {
    use super::MetricName;

    pub fn row_skipped() {
        ::metrics::counter!(MetricName::ExtractRowsSkipped.as_str()).increment(1);
    }

    pub fn row_bad_data() {
        ::metrics::counter!(MetricName::ExtractRowsBadData.as_str()).increment(1);
    }
}

pub mod store {
    use super::MetricName;

    pub fn rows_loaded(count: usize) {
        ::metrics::counter!(MetricName::StoreRowsLoaded.as_str()).increment(count as u64);
    }

    pub fn rows_merged(added: usize, replaced: usize) {
        ::metrics::counter!(MetricName::StoreRowsAdded.as_str()).increment(added as u64);
        ::metrics::counter!(MetricName::StoreRowsReplaced.as_str()).increment(replaced as u64);
    }

    pub fn corrupt_file() {
        ::metrics::counter!(MetricName::StoreCorruptFiles.as_str()).increment(1);
    }

    pub fn rows_undecodable(count: usize) {
        ::metrics::counter!(MetricName::StoreRowsUndecodable.as_str()).increment(count as u64);
    }

    pub fn write() {
        ::metrics::counter!(MetricName::StoreWrites.as_str()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_naming_convention() {
        assert_eq!(
            MetricName::FetchRequestsSuccess.as_str(),
            "boxoffice_fetch_requests_success_total"
        );
        assert_eq!(
            MetricName::FetchRequestDuration.to_string(),
            "boxoffice_fetch_request_duration_seconds"
        );
        assert!(MetricName::CooldownActivations.as_str().starts_with("boxoffice_cooldown_"));
    }
}
