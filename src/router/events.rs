//! Fallback departure events.
//!
//! Emitted synchronously whenever the router is about to invoke a backend
//! other than the configured primary, so host telemetry can see every
//! departure before it happens. The core never implements the sink.

use std::sync::Arc;

use crate::models::ModelLimits;

/// Why the router departed from the primary backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The ordering strategy preferred another backend outright.
    StrategyPreference,
    /// The payload does not fit the primary's context window.
    ContextTooLarge,
    /// A hard budget could not absorb the primary's estimated cost.
    BudgetExhausted,
    /// The primary's rate-limit window did not clear within the wait budget.
    RateLimitTimeout,
    /// The primary was invoked and failed.
    InvocationFailed,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::StrategyPreference => "strategy preference",
            Self::ContextTooLarge => "context too large",
            Self::BudgetExhausted => "budget exhausted",
            Self::RateLimitTimeout => "rate limit timeout",
            Self::InvocationFailed => "invocation failed",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone)]
pub struct FallbackEvent {
    /// The primary model this call was configured to use.
    pub attempted_model: String,
    /// The backend actually being invoked instead.
    pub fallback_model: String,
    pub reason: FallbackReason,
    pub estimated_tokens: u64,
    /// Limits of the backend being invoked.
    pub limits: ModelLimits,
}

pub type FallbackHook = Arc<dyn Fn(&FallbackEvent) + Send + Sync>;
