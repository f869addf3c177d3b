//! The routing facade.
//!
//! One `invoke` walks the candidate list in strategy order, applying the
//! context, budget, and rate-limit gates per candidate, and invokes at most
//! one backend at a time. Per-candidate failures stay local to the loop;
//! only a successful response or an aggregated terminal error crosses the
//! router boundary.

mod builder;
mod events;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::backend::{BackendDescriptor, BackendResponse, FallbackChain};
use crate::budget::{BudgetEnforcer, BudgetPeriod, PeriodStatus};
use crate::context::ContextFitPolicy;
use crate::models::{ModelLimits, PricingTable};
use crate::scheduler::RateLimitScheduler;
use crate::strategy::{BackendStats, FallbackStrategy};
use crate::usage::UsageLedger;
use crate::{AttemptFailure, Error, FailureReason, Result};

pub use builder::{DEFAULT_MAX_WAIT, RouterBuilder};
pub use events::{FallbackEvent, FallbackHook, FallbackReason};

/// In-window usage for one configured backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub provider: String,
    pub model_name: String,
    pub requests_in_window: u64,
    pub tokens_in_window: u64,
    pub limits: ModelLimits,
}

/// Introspection snapshot across the whole router.
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub backends: Vec<BackendStatus>,
    pub budget: BTreeMap<BudgetPeriod, PeriodStatus>,
}

pub struct Router {
    chain: FallbackChain,
    strategy: Box<dyn FallbackStrategy>,
    ledger: Arc<UsageLedger>,
    scheduler: RateLimitScheduler,
    budget: BudgetEnforcer,
    context: ContextFitPolicy,
    pricing: Arc<PricingTable>,
    stats: Arc<BackendStats>,
    max_wait: Duration,
    context_fallback: bool,
    on_fallback: Option<FallbackHook>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Route one call. Candidates are tried strictly sequentially; a
    /// candidate is attempted at most once per logical call.
    pub async fn invoke(&self, payload: &str) -> Result<BackendResponse> {
        let estimated_tokens = self.context.estimate_tokens(payload);
        let candidates = self.strategy.order(&self.chain.candidates());
        let mut failures: Vec<AttemptFailure> = Vec::new();
        let mut any_fit = false;

        for backend in &candidates {
            let fit = self.context.fits(payload, backend);
            if !fit.fits {
                tracing::debug!(
                    model = %backend.model_name(),
                    estimated_tokens = fit.estimated_tokens,
                    max_context = fit.max_context,
                    "payload does not fit context window, skipping"
                );
                failures.push(AttemptFailure {
                    model: backend.model_name().to_string(),
                    reason: FailureReason::ContextTooLarge {
                        estimated_tokens: fit.estimated_tokens,
                        max_context: fit.max_context,
                    },
                });
                continue;
            }
            any_fit = true;

            if let Some(response) = self
                .attempt(backend, payload, estimated_tokens, &mut failures)
                .await
            {
                return Ok(response);
            }
        }

        // No candidate could hold the payload in strategy order. Correctness
        // beats preference here: retarget to any configured backend whose
        // window is large enough, smallest first.
        if !any_fit && self.context_fallback {
            let rescue = self
                .context
                .select_context_capable(payload, &self.chain.candidates())?;
            if let Some(response) = self
                .attempt(&rescue, payload, estimated_tokens, &mut failures)
                .await
            {
                return Ok(response);
            }
        }

        Err(Self::terminal_error(estimated_tokens, failures))
    }

    /// Run one candidate through the budget and rate-limit gates and invoke
    /// it. Pushes an `AttemptFailure` and returns `None` on any recoverable
    /// skip or failure.
    async fn attempt(
        &self,
        backend: &BackendDescriptor,
        payload: &str,
        estimated_tokens: u64,
        failures: &mut Vec<AttemptFailure>,
    ) -> Option<BackendResponse> {
        let key = backend.key();

        let estimated_cost = self.pricing.estimate(backend.model_name(), estimated_tokens);
        if let Some((period, budget, spent)) = self.budget.blocking_period(estimated_cost, None) {
            tracing::debug!(
                model = %backend.model_name(),
                estimated_cost,
                %period,
                "estimated cost not affordable, skipping"
            );
            failures.push(AttemptFailure {
                model: backend.model_name().to_string(),
                reason: FailureReason::BudgetExceeded {
                    period,
                    budget,
                    spent,
                },
            });
            return None;
        }

        if !self
            .scheduler
            .wait_until_ready(&key, estimated_tokens, self.max_wait)
            .await
        {
            failures.push(AttemptFailure {
                model: backend.model_name().to_string(),
                reason: FailureReason::RateLimitTimeout {
                    waited: self.max_wait,
                },
            });
            return None;
        }

        self.notify_if_departed(backend, estimated_tokens, failures);

        self.scheduler.record_request(&key, estimated_tokens);

        let started = Instant::now();
        match backend.invoke(payload).await {
            Ok(response) => {
                let latency = started.elapsed();
                self.stats.record(&key, true, latency);

                let cost = self.pricing.calculate(backend.model_name(), &response.usage);
                if let Err(err) = self.budget.record_cost(cost, Some(&key)) {
                    // The spend already happened; the next call gets blocked
                    // up front instead.
                    tracing::warn!(
                        model = %backend.model_name(),
                        cost,
                        error = %err,
                        "completed call pushed a hard budget over its limit"
                    );
                }

                tracing::info!(
                    model = %backend.model_name(),
                    tokens = response.usage.total(),
                    cost,
                    latency_ms = latency.as_millis() as u64,
                    "backend call succeeded"
                );
                Some(response)
            }
            Err(source) => {
                self.stats.record(&key, false, started.elapsed());
                tracing::warn!(
                    model = %backend.model_name(),
                    error = %source,
                    "backend invocation failed, advancing to next candidate"
                );
                failures.push(AttemptFailure {
                    model: backend.model_name().to_string(),
                    reason: FailureReason::Invocation {
                        message: source.to_string(),
                    },
                });
                None
            }
        }
    }

    /// Emit the `on_fallback` event when the backend about to be invoked is
    /// not the configured primary.
    fn notify_if_departed(
        &self,
        backend: &BackendDescriptor,
        estimated_tokens: u64,
        failures: &[AttemptFailure],
    ) {
        let primary = self.chain.primary();
        if backend.key() == primary.key() {
            return;
        }

        let reason = failures
            .iter()
            .find(|failure| failure.model == primary.model_name())
            .map(|failure| match failure.reason {
                FailureReason::ContextTooLarge { .. } => FallbackReason::ContextTooLarge,
                FailureReason::BudgetExceeded { .. } => FallbackReason::BudgetExhausted,
                FailureReason::RateLimitTimeout { .. } => FallbackReason::RateLimitTimeout,
                FailureReason::Invocation { .. } => FallbackReason::InvocationFailed,
            })
            .unwrap_or(FallbackReason::StrategyPreference);

        let event = FallbackEvent {
            attempted_model: primary.model_name().to_string(),
            fallback_model: backend.model_name().to_string(),
            reason,
            estimated_tokens,
            limits: backend.limits().clone(),
        };

        tracing::warn!(
            attempted = %event.attempted_model,
            fallback = %event.fallback_model,
            reason = %event.reason,
            "departing from primary backend"
        );

        if let Some(hook) = &self.on_fallback {
            hook(&event);
        }
    }

    fn terminal_error(estimated_tokens: u64, failures: Vec<AttemptFailure>) -> Error {
        let all_context = failures
            .iter()
            .all(|f| matches!(f.reason, FailureReason::ContextTooLarge { .. }));
        if all_context && !failures.is_empty() {
            let max_context = failures
                .iter()
                .filter_map(|f| match f.reason {
                    FailureReason::ContextTooLarge { max_context, .. } => Some(max_context),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            return Error::ContextTooLarge {
                estimated_tokens,
                max_context,
            };
        }

        let all_budget = failures
            .iter()
            .all(|f| matches!(f.reason, FailureReason::BudgetExceeded { .. }));
        if all_budget && !failures.is_empty() {
            if let FailureReason::BudgetExceeded {
                period,
                budget,
                spent,
            } = &failures[0].reason
            {
                return Error::BudgetExceeded {
                    budget: *budget,
                    spent: *spent,
                    period: *period,
                };
            }
        }

        Error::AllBackendsExhausted(crate::ExhaustionReport { failures })
    }

    /// Per-backend window usage plus per-period budget state, for health
    /// endpoints.
    pub fn status(&self) -> RouterStatus {
        let backends = self
            .chain
            .candidates()
            .iter()
            .map(|backend| {
                let usage = self.ledger.usage(&backend.key());
                BackendStatus {
                    provider: backend.provider().to_string(),
                    model_name: backend.model_name().to_string(),
                    requests_in_window: usage.requests,
                    tokens_in_window: usage.tokens,
                    limits: backend.limits().clone(),
                }
            })
            .collect();

        RouterStatus {
            backends,
            budget: self.budget.status(),
        }
    }

    pub fn budget(&self) -> &BudgetEnforcer {
        &self.budget
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &BackendStats {
        &self.stats
    }

    pub fn primary(&self) -> &BackendDescriptor {
        self.chain.primary()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        chain: FallbackChain,
        strategy: Box<dyn FallbackStrategy>,
        ledger: Arc<UsageLedger>,
        scheduler: RateLimitScheduler,
        budget: BudgetEnforcer,
        context: ContextFitPolicy,
        pricing: Arc<PricingTable>,
        stats: Arc<BackendStats>,
        max_wait: Duration,
        context_fallback: bool,
        on_fallback: Option<FallbackHook>,
    ) -> Self {
        Self {
            chain,
            strategy,
            ledger,
            scheduler,
            budget,
            context,
            pricing,
            stats,
            max_wait,
            context_fallback,
            on_fallback,
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("primary", &self.chain.primary().key())
            .field("fallbacks", &self.chain.fallbacks().len())
            .field("strategy", &self.strategy.kind())
            .field("max_wait", &self.max_wait)
            .field("context_fallback", &self.context_fallback)
            .finish()
    }
}
