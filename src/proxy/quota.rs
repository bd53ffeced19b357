//! Daily-quota governor for the OpenSky feed
//!
//! The feed enforces a hard per-day request allowance. The limiter keeps a
//! rolling 24h window of dispatch times, spreads the remaining budget over
//! the remaining window, and backs off exponentially after a 429.
//!
//! Every time-dependent method has an `*_at(now)` variant so behaviour can be
//! driven with explicit instants.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::OpenSkyConfig;

/// Wait applied after the Nth consecutive 429; the last value repeats.
pub const BACKOFF_SECONDS: [u64; 6] = [10, 20, 40, 80, 160, 300];

const MAX_BACKOFF_LEVEL: usize = BACKOFF_SECONDS.len() - 1;

/// Rolling quota window
pub const QUOTA_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Why a request was held back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleReason {
    /// Budget spread: too soon after the previous dispatch
    Spacing,
    /// Recovering from a 429
    Backoff,
    /// Nothing left in the window
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Throttled {
        reason: ThrottleReason,
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Point-in-time view for `/cache/stats`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub requests_last_24h: usize,
    pub remaining: u32,
    pub backoff_level: usize,
}

#[derive(Debug, Default)]
struct QuotaState {
    requests: VecDeque<Instant>,
    backoff_level: usize,
    backoff_until: Option<Instant>,
    last_success_at: Option<Instant>,
}

impl QuotaState {
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.requests.front() {
            if now.saturating_duration_since(oldest) >= QUOTA_WINDOW {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Rolling-window quota tracker with exponential backoff
#[derive(Debug)]
pub struct QuotaLimiter {
    budget: u32,
    state: Mutex<QuotaState>,
}

impl QuotaLimiter {
    /// `budget` is the number of requests the limiter may spend per window
    pub fn new(budget: u32) -> Self {
        Self {
            budget,
            state: Mutex::new(QuotaState::default()),
        }
    }

    /// Budget is `safety_margin × daily_quota`, rounded down
    pub fn from_config(config: &OpenSkyConfig) -> Self {
        let budget = (config.daily_quota as f64 * config.safety_margin).floor() as u32;
        Self::new(budget)
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    fn lock(&self) -> MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn can_request(&self) -> bool {
        self.check_at(Instant::now()).is_allowed()
    }

    /// Admission decision without recording anything
    pub fn check_at(&self, now: Instant) -> Admission {
        let mut state = self.lock();
        state.prune(now);
        self.admit(&state, now)
    }

    /// Check and, when allowed, record a dispatch in one step
    pub fn try_acquire(&self) -> Admission {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Admission {
        let mut state = self.lock();
        state.prune(now);
        let admission = self.admit(&state, now);
        if admission.is_allowed() {
            state.requests.push_back(now);
        }
        admission
    }

    /// Any non-429 success clears the backoff
    pub fn record_success(&self) {
        self.record_success_at(Instant::now())
    }

    pub fn record_success_at(&self, now: Instant) {
        let mut state = self.lock();
        if state.backoff_level > 0 {
            log::info!("OpenSky recovered, backoff reset from level {}", state.backoff_level);
        }
        state.backoff_level = 0;
        state.backoff_until = None;
        state.last_success_at = Some(now);
    }

    /// Escalate after a 429. Returns the wait imposed.
    pub fn record_rate_limited(&self) -> Duration {
        self.record_rate_limited_at(Instant::now())
    }

    pub fn record_rate_limited_at(&self, now: Instant) -> Duration {
        let mut state = self.lock();
        let level = state.backoff_level.min(MAX_BACKOFF_LEVEL);
        let wait = Duration::from_secs(BACKOFF_SECONDS[level]);
        state.backoff_level = (level + 1).min(MAX_BACKOFF_LEVEL);
        state.backoff_until = Some(now + wait);
        log::warn!(
            "OpenSky rate limited, backing off {}s (level {})",
            wait.as_secs(),
            state.backoff_level
        );
        wait
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> QuotaSnapshot {
        let mut state = self.lock();
        state.prune(now);
        QuotaSnapshot {
            requests_last_24h: state.requests.len(),
            remaining: self.remaining(&state),
            backoff_level: state.backoff_level,
        }
    }

    /// Time since the last successful upstream response
    pub fn since_last_success_at(&self, now: Instant) -> Option<Duration> {
        self.lock()
            .last_success_at
            .map(|t| now.saturating_duration_since(t))
    }

    fn remaining(&self, state: &QuotaState) -> u32 {
        self.budget.saturating_sub(state.requests.len() as u32)
    }

    /// Minimum gap between dispatches: what is left of the window divided
    /// by what is left of the budget.
    fn spacing(&self, state: &QuotaState, now: Instant) -> Duration {
        let remaining = self.remaining(state);
        if remaining == 0 {
            return QUOTA_WINDOW;
        }
        let horizon = match state.requests.front() {
            Some(&oldest) => (oldest + QUOTA_WINDOW).saturating_duration_since(now),
            None => QUOTA_WINDOW,
        };
        horizon / remaining
    }

    fn admit(&self, state: &QuotaState, now: Instant) -> Admission {
        if self.remaining(state) == 0 {
            let retry_after = state
                .requests
                .front()
                .map(|&oldest| (oldest + QUOTA_WINDOW).saturating_duration_since(now))
                .unwrap_or(QUOTA_WINDOW);
            return Admission::Throttled {
                reason: ThrottleReason::Exhausted,
                retry_after,
            };
        }

        if let Some(until) = state.backoff_until
            && until > now
        {
            return Admission::Throttled {
                reason: ThrottleReason::Backoff,
                retry_after: until - now,
            };
        }

        if let Some(&last) = state.requests.back() {
            let next = last + self.spacing(state, now);
            if next > now {
                return Admission::Throttled {
                    reason: ThrottleReason::Spacing,
                    retry_after: next - now,
                };
            }
        }

        Admission::Allowed
    }
}
