//! # model-router
//!
//! Rate-limit-aware request routing for LLM backends.
//!
//! Outbound calls to rate-limited, cost-metered, context-bounded model
//! services degrade gracefully here: the router waits out sliding-window
//! rate limits, falls back across an ordered chain of backends, and
//! escalates to a larger-context backend when the payload demands it,
//! instead of surfacing hard failures from any single backend.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use model_router::{BudgetConfig, BudgetPeriod, Router};
//! # use model_router::backend::testing::StaticBackend;
//! # use model_router::ModelLimits;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), model_router::Error> {
//!     # let primary = Arc::new(StaticBackend::succeeding(ModelLimits::new(
//!     #     "anthropic", "claude-sonnet-4-5", 500, 80_000, 200_000)));
//!     # let fallback = Arc::new(StaticBackend::succeeding(ModelLimits::new(
//!     #     "google", "gemini-2.5-pro", 1_000, 4_000_000, 2_097_152)));
//!     let router = Router::builder()
//!         .with_primary(primary)
//!         .with_fallback(fallback)
//!         .with_budget(BudgetConfig::new(BudgetPeriod::Daily, 50.0))
//!         .build()?;
//!
//!     let response = router.invoke("Summarize this document").await?;
//!     println!("{}", response.text);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backend;
pub mod budget;
pub mod context;
pub mod models;
pub mod prelude;
pub mod router;
pub mod scheduler;
pub mod strategy;
pub mod usage;

// Re-exports for convenience
pub use backend::{
    BackendDescriptor, BackendInvoker, BackendResponse, BoxError, FallbackChain, Usage,
};
pub use budget::{BudgetConfig, BudgetEnforcer, BudgetPeriod, PeriodStatus};
pub use context::{ContextFitPolicy, FitCheck};
pub use models::{ModelLimits, ModelPricing, PricingTable, PricingTableBuilder};
pub use router::{
    BackendStatus, DEFAULT_MAX_WAIT, FallbackEvent, FallbackHook, FallbackReason, Router,
    RouterBuilder, RouterStatus,
};
pub use scheduler::{DEFAULT_SAFETY_MARGIN, Decision, RateLimitScheduler};
pub use strategy::{
    BackendHealth, BackendStats, FallbackStrategy, FallbackStrategyKind, make_strategy,
};
pub use usage::{UsageLedger, UsageSnapshot};

/// Why one candidate was skipped or failed during a routing attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    ContextTooLarge {
        estimated_tokens: u64,
        max_context: u64,
    },
    BudgetExceeded {
        period: BudgetPeriod,
        budget: f64,
        spent: f64,
    },
    RateLimitTimeout {
        waited: std::time::Duration,
    },
    Invocation {
        message: String,
    },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContextTooLarge {
                estimated_tokens,
                max_context,
            } => write!(
                f,
                "context too large ({estimated_tokens} tokens > {max_context} window)"
            ),
            Self::BudgetExceeded {
                period,
                budget,
                spent,
            } => write!(f, "{period} budget exceeded (${spent:.2} of ${budget:.2})"),
            Self::RateLimitTimeout { waited } => {
                write!(f, "rate limit timeout after {:.1}s", waited.as_secs_f64())
            }
            Self::Invocation { message } => write!(f, "invocation error: {message}"),
        }
    }
}

/// One candidate's failure, in attempt order.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub model: String,
    pub reason: FailureReason,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.model, self.reason)
    }
}

/// Every candidate's failure from one exhausted routing attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ExhaustionReport {
    pub failures: Vec<AttemptFailure>,
}

impl std::fmt::Display for ExhaustionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "all backends exhausted after {} attempts",
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

/// Error type for model-router operations.
///
/// Per-candidate failures (rate-limit timeouts, invocation errors) are
/// handled inside the routing loop and only ever surface aggregated in
/// [`Error::AllBackendsExhausted`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No configured backend's context window can hold the input.
    #[error(
        "Context too large: estimated {estimated_tokens} tokens exceeds the largest available window of {max_context}"
    )]
    ContextTooLarge {
        estimated_tokens: u64,
        max_context: u64,
    },

    /// A hard budget limit blocks further spend.
    #[error("Budget exceeded for {period} period: ${spent:.2} spent against ${budget:.2}")]
    BudgetExceeded {
        budget: f64,
        spent: f64,
        period: BudgetPeriod,
    },

    /// Every candidate was tried or skipped without success.
    #[error("{0}")]
    AllBackendsExhausted(ExhaustionReport),
}

impl Error {
    pub fn is_context_too_large(&self) -> bool {
        matches!(self, Self::ContextTooLarge { .. })
    }

    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::AllBackendsExhausted(_))
    }

    /// Per-candidate failures when every backend was exhausted.
    pub fn failures(&self) -> Option<&[AttemptFailure]> {
        match self {
            Self::AllBackendsExhausted(report) => Some(&report.failures),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
