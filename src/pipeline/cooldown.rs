//! Global cooldown governor.
//!
//! A single 429 seen by any worker closes the gate for every worker of the run.
//! Workers call [`CooldownGovernor::wait_if_active`] before each attempt, so a
//! request already in flight finishes but the next one waits.

use crate::app::ports::CooldownPort;
use crate::observability::metrics;
use crate::pipeline::clock::Clock;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Longest single sleep while waiting, so extensions are noticed promptly.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Clone, Copy)]
pub struct CooldownState {
    pub active_until: Option<Instant>,
    pub is_active: bool,
}

pub struct CooldownGovernor {
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<CooldownState>,
}

impl CooldownGovernor {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            state: Mutex::new(CooldownState::default()),
        }
    }

    pub fn state(&self) -> CooldownState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active
    }

    /// Time left in the current window, zero when the gate is open.
    pub fn remaining(&self) -> Duration {
        let now = self.clock.now();
        self.state()
            .active_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn trigger(&self) {
        let until = self.clock.now() + self.window;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active_until = Some(until);
        if !state.is_active {
            state.is_active = true;
            metrics::cooldown::activated();
            warn!("Global cooldown for {}s", self.window.as_secs_f64());
        }
    }

    pub async fn wait_if_active(&self) {
        loop {
            let remaining = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                let now = self.clock.now();
                let remaining = state
                    .active_until
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or_default();
                if remaining.is_zero() && state.is_active {
                    state.is_active = false;
                    info!("Cooldown ended, resuming requests");
                }
                remaining
            };
            if remaining.is_zero() {
                return;
            }
            self.clock.sleep(remaining.min(MAX_POLL_INTERVAL)).await;
        }
    }
}

#[async_trait]
impl CooldownPort for CooldownGovernor {
    fn trigger(&self) {
        CooldownGovernor::trigger(self);
    }

    async fn wait_if_active(&self) {
        CooldownGovernor::wait_if_active(self).await;
    }
}
