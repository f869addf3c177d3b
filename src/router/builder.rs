//! Fluent router assembly, validated at `build()`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendDescriptor, BackendInvoker, FallbackChain};
use crate::budget::{BudgetConfig, BudgetEnforcer};
use crate::context::{ContextFitPolicy, DEFAULT_CHARS_PER_TOKEN};
use crate::models::PricingTable;
use crate::scheduler::{DEFAULT_SAFETY_MARGIN, RateLimitScheduler};
use crate::strategy::{BackendStats, FallbackStrategyKind, make_strategy};
use crate::usage::UsageLedger;
use crate::{Error, Result};

use super::Router;
use super::events::{FallbackEvent, FallbackHook};

/// Upper bound on the aggregate rate-limit wait per candidate.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

pub struct RouterBuilder {
    primary: Option<BackendDescriptor>,
    fallbacks: Vec<BackendDescriptor>,
    budgets: Vec<BudgetConfig>,
    strategy: FallbackStrategyKind,
    context_fallback: bool,
    max_wait: Duration,
    safety_margin: u64,
    chars_per_token: u32,
    pricing: Option<PricingTable>,
    on_fallback: Option<FallbackHook>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self {
            primary: None,
            fallbacks: Vec::new(),
            budgets: Vec::new(),
            strategy: FallbackStrategyKind::default(),
            context_fallback: true,
            max_wait: DEFAULT_MAX_WAIT,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            pricing: None,
            on_fallback: None,
        }
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend every call prefers. Required exactly once.
    pub fn with_primary(mut self, invoker: Arc<dyn BackendInvoker>) -> Self {
        self.primary = Some(BackendDescriptor::new(invoker));
        self
    }

    /// Append one fallback; configured order is the Sequential default.
    pub fn with_fallback(mut self, invoker: Arc<dyn BackendInvoker>) -> Self {
        self.fallbacks.push(BackendDescriptor::new(invoker));
        self
    }

    pub fn with_fallbacks(
        mut self,
        invokers: impl IntoIterator<Item = Arc<dyn BackendInvoker>>,
    ) -> Self {
        self.fallbacks
            .extend(invokers.into_iter().map(BackendDescriptor::new));
        self
    }

    /// Add a budget for one period. At most one config per period.
    pub fn with_budget(mut self, config: BudgetConfig) -> Self {
        self.budgets.push(config);
        self
    }

    pub fn with_budgets(mut self, configs: impl IntoIterator<Item = BudgetConfig>) -> Self {
        self.budgets.extend(configs);
        self
    }

    pub fn with_fallback_strategy(mut self, kind: FallbackStrategyKind) -> Self {
        self.strategy = kind;
        self
    }

    /// Whether a payload too large for every preferred candidate may be
    /// retargeted to any configured backend with a big enough window.
    pub fn with_context_fallback(mut self, enabled: bool) -> Self {
        self.context_fallback = enabled;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_safety_margin(mut self, safety_margin: u64) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    pub fn with_chars_per_token(mut self, chars_per_token: u32) -> Self {
        self.chars_per_token = chars_per_token;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Synchronous callback for every departure from the primary backend.
    pub fn on_fallback(mut self, hook: impl Fn(&FallbackEvent) + Send + Sync + 'static) -> Self {
        self.on_fallback = Some(Arc::new(hook));
        self
    }

    /// Assemble the immutable router. Fails when no primary was configured
    /// or a budget config is malformed or duplicated.
    pub fn build(self) -> Result<Router> {
        let primary = self
            .primary
            .ok_or_else(|| Error::Config("no primary backend configured".to_string()))?;

        let mut seen_periods = HashSet::new();
        for config in &self.budgets {
            if !seen_periods.insert(config.period) {
                return Err(Error::Config(format!(
                    "duplicate budget config for {} period",
                    config.period
                )));
            }
        }

        let chain = FallbackChain::new(primary, self.fallbacks);

        let ledger = Arc::new(UsageLedger::new());
        let scheduler = RateLimitScheduler::new(Arc::clone(&ledger), self.safety_margin);
        for backend in chain.candidates() {
            scheduler.register(backend.limits().clone());
        }

        let budget = BudgetEnforcer::new(self.budgets)?;
        let pricing = Arc::new(self.pricing.unwrap_or_default());
        let stats = Arc::new(BackendStats::new());
        let strategy = make_strategy(self.strategy, Arc::clone(&pricing), Arc::clone(&stats));

        tracing::debug!(
            primary = %chain.primary().key(),
            fallbacks = chain.fallbacks().len(),
            strategy = ?strategy.kind(),
            "router built"
        );

        Ok(Router::from_parts(
            chain,
            strategy,
            ledger,
            scheduler,
            budget,
            ContextFitPolicy::new(self.chars_per_token),
            pricing,
            stats,
            self.max_wait,
            self.context_fallback,
            self.on_fallback,
        ))
    }
}
