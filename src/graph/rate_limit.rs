//! Rolling-window rate limiting with bounded exponential backoff.
//!
//! Two independent windows are tracked: every outgoing Graph request counts
//! against the hourly request ceiling, and every successful publish counts
//! against the daily publishing ceiling.
//!
//! A slot is reserved by taking a [`Permit`]. The call is recorded in the
//! window only when the permit is committed; a permit dropped without being
//! committed (for example because the caller abandoned the future) simply
//! releases its reservation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::graph::error::{GraphError, GraphResult, Quota};

/// Length of the request window.
pub const HOUR: Duration = Duration::from_secs(60 * 60);

/// Length of the publishing window.
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Retry and backoff settings shared by rate-limit and network retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait and retry when a quota is exhausted instead of failing fast.
    pub enabled: bool,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based): `base * 2^attempt`, capped.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Call counter over a trailing period.
#[derive(Debug)]
struct RateWindow {
    calls: VecDeque<Instant>,
    in_flight: u32,
    limit: u32,
    period: Duration,
}

impl RateWindow {
    fn new(limit: u32, period: Duration) -> Self {
        Self {
            calls: VecDeque::new(),
            in_flight: 0,
            limit,
            period,
        }
    }

    /// Forgets calls older than one period.
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= self.period {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn call_count(&mut self, now: Instant) -> u32 {
        self.prune(now);
        u32::try_from(self.calls.len()).unwrap_or(u32::MAX)
    }

    /// Reserves a slot, or returns how long until one frees up.
    fn reserve(&mut self, now: Instant) -> Result<(), Duration> {
        let used = self.call_count(now).saturating_add(self.in_flight);
        if used < self.limit {
            self.in_flight += 1;
            return Ok(());
        }

        // With only in-flight reservations there is no timestamp to wait on.
        let wait = self.calls.front().map_or(Duration::ZERO, |&oldest| {
            (oldest + self.period).saturating_duration_since(now)
        });
        Err(wait)
    }
}

/// Reservation of one slot in a rate window.
///
/// Call [`Permit::commit`] once the call has definitively happened.
#[derive(Debug)]
#[must_use = "dropping a permit without committing releases the slot"]
pub struct Permit {
    window: Arc<Mutex<RateWindow>>,
}

impl Permit {
    /// Records the call in the window.
    pub fn commit(self) {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.calls.push_back(Instant::now());
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.in_flight = window.in_flight.saturating_sub(1);
    }
}

/// Usage snapshot of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowStatus {
    /// Calls recorded within the trailing period.
    pub used: u32,
    /// Configured ceiling.
    pub limit: u32,
    /// Slots left, excluding in-flight reservations.
    pub remaining: u32,
    /// Window length in seconds.
    pub period_seconds: u64,
}

/// Usage snapshot of both windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Hourly request window.
    pub requests: WindowStatus,
    /// Daily publishing window.
    pub publishing: WindowStatus,
}

/// Tracks the hourly request and daily publishing quotas.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<RateWindow>>,
    publishing: Arc<Mutex<RateWindow>>,
}

impl RateLimiter {
    /// Creates a limiter with the given ceilings.
    #[must_use]
    pub fn new(requests_per_hour: u32, posts_per_day: u32) -> Self {
        Self::with_periods(requests_per_hour, HOUR, posts_per_day, DAY)
    }

    /// Creates a limiter with custom window lengths.
    #[must_use]
    pub fn with_periods(
        request_limit: u32,
        request_period: Duration,
        publish_limit: u32,
        publish_period: Duration,
    ) -> Self {
        Self {
            requests: Arc::new(Mutex::new(RateWindow::new(request_limit, request_period))),
            publishing: Arc::new(Mutex::new(RateWindow::new(publish_limit, publish_period))),
        }
    }

    fn window(&self, quota: Quota) -> &Arc<Mutex<RateWindow>> {
        match quota {
            Quota::Publishing => &self.publishing,
            Quota::Requests | Quota::Upstream => &self.requests,
        }
    }

    /// Tries to reserve a slot without waiting.
    ///
    /// # Errors
    ///
    /// Returns the time until the oldest recorded call leaves the window.
    pub fn try_acquire(&self, quota: Quota) -> Result<Permit, Duration> {
        let window = self.window(quota);
        window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reserve(Instant::now())?;
        Ok(Permit {
            window: Arc::clone(window),
        })
    }

    /// Reserves a slot, backing off while the quota is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::RateLimited`] if backoff is disabled or retries
    /// run out.
    pub async fn acquire(&self, quota: Quota, policy: &BackoffPolicy) -> GraphResult<Permit> {
        let mut attempt = 0;
        loop {
            let wait = match self.try_acquire(quota) {
                Ok(permit) => return Ok(permit),
                Err(wait) => wait,
            };

            if !policy.enabled || attempt >= policy.max_retries {
                tracing::warn!(%quota, attempts = attempt + 1, "Rate limit exhausted");
                return Err(GraphError::RateLimited {
                    quota,
                    retry_after: Some(wait),
                    attempts: attempt + 1,
                    detail: None,
                });
            }

            let delay = policy.delay(attempt).min(wait.max(policy.base_delay));
            tracing::debug!(%quota, attempt, delay_ms = delay.as_millis(), "Rate limited, backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Current usage of both windows.
    #[must_use]
    pub fn status(&self) -> RateLimitStatus {
        RateLimitStatus {
            requests: Self::window_status(&self.requests),
            publishing: Self::window_status(&self.publishing),
        }
    }

    fn window_status(window: &Mutex<RateWindow>) -> WindowStatus {
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        let used = window.call_count(Instant::now());
        WindowStatus {
            used,
            limit: window.limit,
            remaining: window.limit.saturating_sub(used),
            period_seconds: window.period.as_secs(),
        }
    }
}
