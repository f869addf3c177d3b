//! Proactive rate-limit scheduling.
//!
//! The scheduler answers one question before every call: may this request
//! go out now, and if not, how long until it can? Admission requires both
//! dimensions of the sliding window (requests and tokens) to stay within
//! the safe limits, plus a minimum spacing of `60 / RPM` seconds since the
//! last recorded call so bursts spread across the window instead of landing
//! at one instant.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::models::ModelLimits;
use crate::usage::{UsageLedger, WINDOW};

/// Fixed headroom subtracted from both the request and token limits.
///
/// A fixed integer, not a percentage: it compensates for clock skew and
/// server-side counting differences. This is a poor fit for very-low-RPM
/// tiers (an RPM=1 backend is never admitted with the default margin;
/// configure a margin of 0 there) but is kept as the literal contract
/// rather than silently rescaling.
pub const DEFAULT_SAFETY_MARGIN: u64 = 2;

/// Floor for the recheck sleep so a near-zero wait never busy-loops.
const MIN_POLL: Duration = Duration::from_millis(10);

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Ready,
    Wait(Duration),
}

impl Decision {
    pub fn should_proceed(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn wait(&self) -> Duration {
        match self {
            Self::Ready => Duration::ZERO,
            Self::Wait(wait) => *wait,
        }
    }
}

#[derive(Debug)]
pub struct RateLimitScheduler {
    ledger: Arc<UsageLedger>,
    limits: DashMap<String, ModelLimits>,
    safety_margin: u64,
}

impl RateLimitScheduler {
    pub fn new(ledger: Arc<UsageLedger>, safety_margin: u64) -> Self {
        Self {
            ledger,
            limits: DashMap::new(),
            safety_margin,
        }
    }

    /// Register the limits for one backend. Called by the builder for every
    /// configured backend before the router is handed out.
    pub fn register(&self, limits: ModelLimits) {
        self.limits.insert(limits.key(), limits);
    }

    pub fn safety_margin(&self) -> u64 {
        self.safety_margin
    }

    /// Whether a request carrying `tokens` may go out now for `key`, and if
    /// not, how long to wait. The whole check runs under the key's window
    /// guard so concurrent callers cannot interleave evict and count.
    pub fn can_proceed(&self, key: &str, tokens: u64) -> Decision {
        let Some(limits) = self.limits.get(key).map(|l| l.value().clone()) else {
            tracing::debug!(model = key, "no limits registered, admitting");
            return Decision::Ready;
        };

        let safe_requests = limits.requests_per_minute.saturating_sub(self.safety_margin);
        let safe_tokens = limits.tokens_per_minute.saturating_sub(self.safety_margin);
        let spacing = limits.min_spacing();

        self.ledger.with_window(key, |window| {
            let now = Instant::now();

            let spacing_remaining = match window.last_call() {
                Some(last) => spacing.saturating_sub(now.duration_since(last)),
                None => Duration::ZERO,
            };
            let drain = window.time_to_admit(now, tokens, safe_requests, safe_tokens);

            if spacing_remaining.is_zero() && drain.is_zero() {
                Decision::Ready
            } else {
                let wait = spacing_remaining.max(drain);
                tracing::debug!(
                    model = key,
                    tokens,
                    wait_secs = wait.as_secs_f64(),
                    "rate limit not clear"
                );
                Decision::Wait(wait)
            }
        })
    }

    /// Record an admitted request. Must run after a `Ready` decision and
    /// before the backend is invoked, so concurrent callers see the
    /// reservation in the window.
    pub fn record_request(&self, key: &str, tokens: u64) {
        self.ledger.record(key, tokens);
    }

    /// Poll `can_proceed`, sleeping the returned wait (bounded), until ready
    /// or until the elapsed time would exceed `max_wait`. Never blocks past
    /// the deadline and never loops unboundedly.
    pub async fn wait_until_ready(&self, key: &str, tokens: u64, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;

        loop {
            match self.can_proceed(key, tokens) {
                Decision::Ready => return true,
                Decision::Wait(wait) => {
                    let now = Instant::now();
                    if now + wait > deadline {
                        tracing::debug!(
                            model = key,
                            wait_secs = wait.as_secs_f64(),
                            max_wait_secs = max_wait.as_secs_f64(),
                            "rate limit wait would exceed deadline"
                        );
                        return false;
                    }
                    let sleep_for = wait
                        .max(MIN_POLL)
                        .min(WINDOW)
                        .min(deadline.saturating_duration_since(now));
                    tokio::time::sleep(sleep_for).await;
                }
            }
        }
    }
}
