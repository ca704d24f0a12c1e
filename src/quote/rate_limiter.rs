//! Sliding-window rate limiter with exponential backoff.
//!
//! Two windows (last minute, last hour) of request instants cap the request
//! rate; consecutive failures add a `min(cap, 2^n)` second cool-down measured
//! from the last failure. The backoff is checked before the windows so a
//! failure storm does not also eat the window budget of the retry.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::types::HunterError;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_minute: usize,
    pub requests_per_hour: usize,
    /// Upper bound on the failure cool-down.
    pub backoff_cap: Duration,
    pub exponential_backoff: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 8,
            requests_per_hour: 80,
            backoff_cap: Duration::from_secs(60),
            exponential_backoff: true,
        }
    }
}

/// Point-in-time view of the limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    pub minute_requests: usize,
    pub hour_requests: usize,
    pub consecutive_failures: u32,
    pub minute_limit: usize,
    pub hour_limit: usize,
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LimiterState {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl LimiterState {
    fn evict(&mut self, now: Instant) {
        evict_window(&mut self.minute, now, MINUTE);
        evict_window(&mut self.hour, now, HOUR);
    }
}

fn evict_window(window: &mut VecDeque<Instant>, now: Instant, horizon: Duration) {
    while window.front().is_some_and(|&t| t + horizon <= now) {
        window.pop_front();
    }
}

/// `min(cap, 2^failures)` seconds; zero when there are no failures.
pub fn backoff_for(failures: u32, cap: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let secs = 2u64.checked_pow(failures).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(cap)
}

/// Shared request gate for one aggregator.
///
/// The internal lock covers bookkeeping and waits only; callers issue their
/// request after `acquire` returns and report the outcome separately.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Result<Self, HunterError> {
        if config.requests_per_minute == 0 || config.requests_per_hour == 0 {
            return Err(HunterError::Config(
                "rate limits must allow at least one request".into(),
            ));
        }
        info!(
            per_minute = config.requests_per_minute,
            per_hour = config.requests_per_hour,
            backoff = config.exponential_backoff,
            "Rate limiter initialised"
        );
        Ok(Self {
            config,
            state: Mutex::new(LimiterState::default()),
        })
    }

    /// Wait until one more request is allowed, then record it.
    ///
    /// Dropping the returned future before it completes records nothing.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let mut now = Instant::now();

        if self.config.exponential_backoff && state.consecutive_failures > 0 {
            if let Some(last) = state.last_failure {
                let backoff = backoff_for(state.consecutive_failures, self.config.backoff_cap);
                let elapsed = now.saturating_duration_since(last);
                if elapsed < backoff {
                    let wait = backoff - elapsed;
                    warn!(
                        wait_secs = wait.as_secs_f64(),
                        failures = state.consecutive_failures,
                        "Backing off after consecutive failures"
                    );
                    sleep(wait).await;
                    now = Instant::now();
                }
            }
        }

        state.evict(now);

        while state.minute.len() >= self.config.requests_per_minute {
            let oldest = state.minute[0];
            let wait = (oldest + MINUTE).saturating_duration_since(now);
            warn!(wait_secs = wait.as_secs_f64(), "Per-minute limit reached, waiting");
            sleep(wait).await;
            now = Instant::now();
            state.evict(now);
        }

        while state.hour.len() >= self.config.requests_per_hour {
            let oldest = state.hour[0];
            let wait = (oldest + HOUR).saturating_duration_since(now);
            warn!(wait_secs = wait.as_secs_f64(), "Per-hour limit reached, waiting");
            sleep(wait).await;
            now = Instant::now();
            state.evict(now);
        }

        state.minute.push_back(now);
        state.hour.push_back(now);
        debug!(
            minute = state.minute.len(),
            hour = state.hour.len(),
            "Request slot acquired"
        );
    }

    /// Reset the failure counter.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if state.consecutive_failures > 0 {
            info!(
                failures = state.consecutive_failures,
                "Request succeeded, resetting backoff"
            );
        }
        state.consecutive_failures = 0;
        state.last_failure = None;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure = Some(Instant::now());
        if state.consecutive_failures > 1 {
            warn!(
                failures = state.consecutive_failures,
                next_backoff_secs = backoff_for(state.consecutive_failures, self.config.backoff_cap).as_secs(),
                "Consecutive request failures"
            );
        }
    }

    /// Cool-down the next `acquire` would honour, measured from the last failure.
    pub async fn backoff_delay(&self) -> Duration {
        let state = self.state.lock().await;
        backoff_for(state.consecutive_failures, self.config.backoff_cap)
    }

    pub async fn stats(&self) -> LimiterStats {
        let mut state = self.state.lock().await;
        state.evict(Instant::now());
        LimiterStats {
            minute_requests: state.minute.len(),
            hour_requests: state.hour.len(),
            consecutive_failures: state.consecutive_failures,
            minute_limit: self.config.requests_per_minute,
            hour_limit: self.config.requests_per_hour,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
