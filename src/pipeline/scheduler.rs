//! Bounded concurrency scheduler.
//!
//! Jobs are spawned onto a `JoinSet` and gated by a semaphore sized to the
//! worker count. Results come back in completion order.

use crate::observability::metrics;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Result of one job in a multi-pass run.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    Ok(T),
    /// Upstream gave nothing usable; the job is worth another pass
    NotOk { reason: String },
}

#[derive(Debug)]
pub struct PassReport<J, T> {
    pub completed: Vec<T>,
    /// Jobs still not ok after the last pass
    pub pending: Vec<J>,
    pub passes_run: usize,
}

/// Runs every job with at most `max_workers` in flight.
pub async fn run_all<J, T, F, Fut>(label: &str, jobs: Vec<J>, max_workers: usize, job_fn: F) -> Vec<T>
where
    J: Send + 'static,
    T: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let total = jobs.len();
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let job_fn = Arc::new(job_fn);
    let mut workers = JoinSet::new();

    for job in jobs {
        let semaphore = Arc::clone(&semaphore);
        let job_fn = Arc::clone(&job_fn);
        workers.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            job_fn(job).await
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(result) => {
                results.push(result);
                debug!("{} → {}/{}", label, results.len(), total);
            }
            Err(join_err) => {
                warn!(error = %join_err, "{} worker task failed", label);
            }
        }
    }
    results
}

/// Runs up to `max_passes` sweeps, carrying only not-ok jobs into the next one.
pub async fn run_passes<J, T, F, Fut>(
    label: &str,
    jobs: Vec<J>,
    max_passes: usize,
    max_workers: usize,
    job_fn: F,
) -> PassReport<J, T>
where
    J: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobOutcome<T>> + Send + 'static,
{
    let job_fn = Arc::new(job_fn);
    let mut pending = jobs;
    let mut completed = Vec::new();
    let mut passes_run = 0;

    for pass in 1..=max_passes {
        if pending.is_empty() {
            break;
        }
        passes_run = pass;
        metrics::scheduler::pass_started();
        info!("{}: pass {}/{} with {} pending", label, pass, max_passes, pending.len());

        let job_fn = Arc::clone(&job_fn);
        let results = run_all(label, pending, max_workers, move |job: J| {
            let job_fn = Arc::clone(&job_fn);
            async move {
                // a panicking job must stay pending, so it runs in its own task
                let outcome = match tokio::spawn(job_fn(job.clone())).await {
                    Ok(outcome) => outcome,
                    Err(join_err) => JobOutcome::NotOk {
                        reason: format!("worker task failed: {}", join_err),
                    },
                };
                (job, outcome)
            }
        })
        .await;

        let mut next_round = Vec::new();
        for (job, outcome) in results {
            match outcome {
                JobOutcome::Ok(value) => {
                    metrics::scheduler::job_ok();
                    completed.push(value);
                }
                JobOutcome::NotOk { reason } => {
                    metrics::scheduler::job_not_ok();
                    debug!("{}: job not ok ({}), carried to next pass", label, reason);
                    next_round.push(job);
                }
            }
        }
        pending = next_round;
    }

    if !pending.is_empty() {
        warn!("{}: {} jobs still pending after {} passes", label, pending.len(), passes_run);
    }

    PassReport {
        completed,
        pending,
        passes_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn run_all_never_exceeds_worker_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());

        let results = run_all("test", (0..20).collect::<Vec<u32>>(), 3, move |n| {
            let in_flight = in_flight_c.clone();
            let peak = peak_c.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                n * 2
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let mut sorted = results;
        sorted.sort();
        assert_eq!(sorted, (0..20).map(|n| n * 2).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn run_all_with_no_jobs_is_empty() {
        let results: Vec<u32> = run_all("empty", Vec::<u32>::new(), 4, |n| async move { n }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn job_recovering_on_third_pass_appears_once() {
        let attempts: Arc<Mutex<HashMap<&'static str, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let attempts_c = attempts.clone();

        let report = run_passes("test", vec!["a", "flaky", "b"], 5, 2, move |job| {
            let attempts = attempts_c.clone();
            async move {
                let n = {
                    let mut map = attempts.lock().unwrap();
                    let n = map.entry(job).or_insert(0);
                    *n += 1;
                    *n
                };
                if job == "flaky" && n < 3 {
                    JobOutcome::NotOk { reason: "empty venues".into() }
                } else {
                    JobOutcome::Ok(job.to_string())
                }
            }
        })
        .await;

        assert_eq!(report.passes_run, 3);
        assert!(report.pending.is_empty());
        assert_eq!(report.completed.iter().filter(|j| j.as_str() == "flaky").count(), 1);
        assert_eq!(report.completed.len(), 3);
        let map = attempts.lock().unwrap();
        assert_eq!(map["a"], 1);
        assert_eq!(map["flaky"], 3);
    }

    #[tokio::test]
    async fn job_panicking_on_first_pass_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_c = attempts.clone();

        let report = run_passes("test", vec!["fragile", "steady"], 3, 2, move |job: &'static str| {
            let attempts = attempts_c.clone();
            async move {
                if job == "fragile" && attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("malformed show");
                }
                JobOutcome::Ok(job)
            }
        })
        .await;

        assert_eq!(report.passes_run, 2);
        assert!(report.pending.is_empty());
        let mut completed = report.completed;
        completed.sort();
        assert_eq!(completed, vec!["fragile", "steady"]);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn job_panicking_every_pass_stays_pending() {
        let report: PassReport<u32, u32> = run_passes("test", vec![1, 2], 2, 2, |n| async move {
            if n == 1 {
                panic!("always broken");
            }
            JobOutcome::Ok(n)
        })
        .await;
        assert_eq!(report.pending, vec![1]);
        assert_eq!(report.completed, vec![2]);
    }

    #[tokio::test]
    async fn run_passes_stops_at_pass_budget() {
        let report: PassReport<u32, u32> = run_passes("test", vec![1, 2], 4, 2, |_| async move {
            JobOutcome::NotOk { reason: "no data".into() }
        })
        .await;
        assert_eq!(report.passes_run, 4);
        assert_eq!(report.pending.len(), 2);
        assert!(report.completed.is_empty());
    }

    #[tokio::test]
    async fn run_passes_stops_early_when_nothing_pending() {
        let report = run_passes("test", vec![1u32, 2, 3], 7, 2, |n| async move { JobOutcome::Ok(n) }).await;
        assert_eq!(report.passes_run, 1);
        assert_eq!(report.completed.len(), 3);
    }
}
