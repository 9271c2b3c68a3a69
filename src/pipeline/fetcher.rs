use crate::app::ports::{CooldownPort, HttpRequest, HttpResponse, ResponseClass, Transport};
use crate::error::{Result, ScraperError};
use crate::observability::metrics;
use crate::pipeline::clock::Clock;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    /// Pause before retrying a non-429 failure
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_millis(1500),
        }
    }
}

/// Budget bookkeeping for one logical request.
#[derive(Debug)]
struct RetryState {
    attempts_remaining: u32,
    last_error: Option<String>,
}

#[derive(Debug)]
enum Transition {
    Retry { delay: Option<Duration> },
    Exhausted(ScraperError),
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts_remaining: policy.max_retries,
            last_error: None,
        }
    }

    fn on_failure(&mut self, error: ScraperError, delay: Option<Duration>) -> Transition {
        if self.attempts_remaining == 0 {
            return Transition::Exhausted(error);
        }
        self.attempts_remaining -= 1;
        self.last_error = Some(error.to_string());
        Transition::Retry { delay }
    }
}

/// Wraps a [`Transport`] with bounded retry and the shared cooldown gate.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    cooldown: Arc<dyn CooldownPort>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        cooldown: Arc<dyn CooldownPort>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            cooldown,
            clock,
            policy,
        }
    }

    /// Sends `request` until it succeeds or the retry budget runs out.
    ///
    /// 429 opens the fleet-wide cooldown and retries without an extra pause.
    /// Other statuses and network failures retry after `retry_delay`.
    /// Any other error is returned immediately.
    pub async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut state = RetryState::new(&self.policy);
        loop {
            self.cooldown.wait_if_active().await;

            let started = self.clock.now();
            let (error, delay) = match self.transport.send(request).await {
                Ok(resp) => match resp.class() {
                    ResponseClass::Success => {
                        let elapsed = self.clock.now().saturating_duration_since(started);
                        metrics::fetch::request_success(elapsed.as_secs_f64());
                        return Ok(resp);
                    }
                    ResponseClass::RateLimited => {
                        metrics::fetch::rate_limited();
                        self.cooldown.trigger();
                        (ScraperError::RateLimitExceeded, None)
                    }
                    ResponseClass::Failed(status) => {
                        (ScraperError::HttpStatus { status }, Some(self.policy.retry_delay))
                    }
                },
                Err(err) if err.is_transient() => (err, Some(self.policy.retry_delay)),
                Err(err) => {
                    metrics::fetch::request_error();
                    return Err(err);
                }
            };
            metrics::fetch::request_error();

            match state.on_failure(error, delay) {
                Transition::Exhausted(err) => {
                    warn!(url = %request.url, error = %err, "Giving up after retries");
                    return Err(err);
                }
                Transition::Retry { delay } => {
                    metrics::fetch::retry();
                    debug!(
                        url = %request.url,
                        remaining = state.attempts_remaining,
                        last_error = state.last_error.as_deref().unwrap_or(""),
                        "Retrying request"
                    );
                    if let Some(delay) = delay.filter(|d| !d.is_zero()) {
                        self.clock.sleep(delay).await;
                    }
                }
            }
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T> {
        self.fetch(request).await?.json()
    }

    pub async fn fetch_text(&self, request: &HttpRequest) -> Result<String> {
        Ok(self.fetch(request).await?.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clock::ManualClock;
    use crate::pipeline::cooldown::CooldownGovernor;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Step {
        Status(u16),
        NetworkDown,
        Broken,
    }

    struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &HttpRequest) -> Result<HttpResponse> {
            *self.calls.lock().unwrap() += 1;
            match self.steps.lock().unwrap().pop_front().unwrap_or(Step::Status(200)) {
                Step::Status(status) => Ok(HttpResponse {
                    status,
                    body: b"{}".to_vec(),
                }),
                Step::NetworkDown => Err(ScraperError::Network("connection reset".into())),
                Step::Broken => Err(ScraperError::Config("bad header".into())),
            }
        }
    }

    fn fetcher(
        steps: Vec<Step>,
        max_retries: u32,
    ) -> (RetryingFetcher, Arc<ScriptedTransport>, Arc<CooldownGovernor>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(ScriptedTransport::new(steps));
        let governor = Arc::new(CooldownGovernor::new(Duration::from_secs(6), clock.clone()));
        let fetcher = RetryingFetcher::new(
            transport.clone(),
            governor.clone(),
            clock.clone(),
            RetryPolicy {
                max_retries,
                retry_delay: Duration::from_millis(1500),
            },
        );
        (fetcher, transport, governor, clock)
    }

    #[tokio::test]
    async fn success_returns_immediately() {
        let (fetcher, transport, _, clock) = fetcher(vec![Step::Status(200)], 5);
        let resp = fetcher.fetch(&HttpRequest::get("http://x")).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.calls(), 1);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn server_error_retries_after_fixed_delay() {
        let (fetcher, transport, _, clock) = fetcher(vec![Step::Status(500), Step::Status(502), Step::Status(200)], 5);
        fetcher.fetch(&HttpRequest::get("http://x")).await.unwrap();
        assert_eq!(transport.calls(), 3);
        assert_eq!(clock.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_http_status() {
        let steps = (0..10).map(|_| Step::Status(503)).collect();
        let (fetcher, transport, _, _) = fetcher(steps, 5);
        let err = fetcher.fetch(&HttpRequest::get("http://x")).await.unwrap_err();
        assert!(matches!(err, ScraperError::HttpStatus { status: 503 }));
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test]
    async fn rate_limit_opens_cooldown_and_waits_it_out() {
        let (fetcher, transport, governor, clock) = fetcher(vec![Step::Status(429), Step::Status(200)], 5);
        fetcher.fetch(&HttpRequest::get("http://x")).await.unwrap();
        assert_eq!(transport.calls(), 2);
        // no retry delay on top of the cooldown window
        assert_eq!(clock.elapsed(), Duration::from_secs(6));
        assert!(!governor.is_active());
    }

    #[tokio::test]
    async fn persistent_rate_limit_fails_with_rate_limit_exceeded() {
        let steps = (0..3).map(|_| Step::Status(429)).collect();
        let (fetcher, transport, _, _) = fetcher(steps, 2);
        let err = fetcher.fetch(&HttpRequest::get("http://x")).await.unwrap_err();
        assert!(matches!(err, ScraperError::RateLimitExceeded));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn network_failures_retry_then_propagate() {
        let steps = (0..4).map(|_| Step::NetworkDown).collect();
        let (fetcher, transport, _, _) = fetcher(steps, 3);
        let err = fetcher.fetch(&HttpRequest::get("http://x")).await.unwrap_err();
        assert!(matches!(err, ScraperError::Network(_)));
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let (fetcher, transport, _, _) = fetcher(vec![Step::Broken], 5);
        let err = fetcher.fetch(&HttpRequest::get("http://x")).await.unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn zero_budget_means_single_attempt() {
        let (fetcher, transport, _, _) = fetcher(vec![Step::Status(500)], 0);
        assert!(fetcher.fetch(&HttpRequest::get("http://x")).await.is_err());
        assert_eq!(transport.calls(), 1);
    }
}
