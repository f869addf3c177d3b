//! Fallback ordering strategies.
//!
//! A strategy is a pure ordering function over the candidate set; it never
//! invokes anything. All variants are deterministic for a given candidate
//! set and recorded history (stable sorts, no randomness), which keeps
//! routing behavior testable.

mod stats;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::BackendDescriptor;
use crate::models::PricingTable;

pub use stats::{BackendHealth, BackendStats, STATS_WINDOW};

/// Smart-strategy scoring weights. Success rate dominates, then latency,
/// then cost.
pub const SMART_SUCCESS_WEIGHT: f64 = 0.5;
pub const SMART_LATENCY_WEIGHT: f64 = 0.3;
pub const SMART_COST_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategyKind {
    /// Configured order: primary first, fallbacks as listed.
    #[default]
    Sequential,
    /// Ascending blended $/token.
    CostOptimized,
    /// Weighted score over recent success rate, recent latency, and cost.
    Smart,
}

pub trait FallbackStrategy: Send + Sync {
    fn order(&self, candidates: &[BackendDescriptor]) -> Vec<BackendDescriptor>;

    fn kind(&self) -> FallbackStrategyKind;
}

/// Map a strategy kind to its implementation.
pub fn make_strategy(
    kind: FallbackStrategyKind,
    pricing: Arc<PricingTable>,
    stats: Arc<BackendStats>,
) -> Box<dyn FallbackStrategy> {
    match kind {
        FallbackStrategyKind::Sequential => Box::new(Sequential),
        FallbackStrategyKind::CostOptimized => Box::new(CostOptimized { pricing }),
        FallbackStrategyKind::Smart => Box::new(Smart { pricing, stats }),
    }
}

struct Sequential;

impl FallbackStrategy for Sequential {
    fn order(&self, candidates: &[BackendDescriptor]) -> Vec<BackendDescriptor> {
        candidates.to_vec()
    }

    fn kind(&self) -> FallbackStrategyKind {
        FallbackStrategyKind::Sequential
    }
}

struct CostOptimized {
    pricing: Arc<PricingTable>,
}

impl FallbackStrategy for CostOptimized {
    fn order(&self, candidates: &[BackendDescriptor]) -> Vec<BackendDescriptor> {
        let mut ordered = candidates.to_vec();
        ordered.sort_by(|a, b| {
            let cost_a = self.pricing.get(a.model_name()).blended_per_token();
            let cost_b = self.pricing.get(b.model_name()).blended_per_token();
            cost_a.total_cmp(&cost_b)
        });
        ordered
    }

    fn kind(&self) -> FallbackStrategyKind {
        FallbackStrategyKind::CostOptimized
    }
}

struct Smart {
    pricing: Arc<PricingTable>,
    stats: Arc<BackendStats>,
}

impl Smart {
    /// Higher is better. Latency and cost are normalized against the worst
    /// candidate in the set so the score stays in [0, 1].
    fn scores(&self, candidates: &[BackendDescriptor]) -> Vec<f64> {
        let healths: Vec<BackendHealth> = candidates
            .iter()
            .map(|c| self.stats.health(&c.key()))
            .collect();
        let costs: Vec<f64> = candidates
            .iter()
            .map(|c| self.pricing.get(c.model_name()).blended_per_token())
            .collect();

        let max_latency = healths
            .iter()
            .map(|h| h.mean_latency.as_secs_f64())
            .fold(0.0_f64, f64::max);
        let max_cost = costs.iter().copied().fold(0.0_f64, f64::max);

        healths
            .iter()
            .zip(&costs)
            .map(|(health, cost)| {
                let latency_norm = if max_latency > 0.0 {
                    health.mean_latency.as_secs_f64() / max_latency
                } else {
                    0.0
                };
                let cost_norm = if max_cost > 0.0 { cost / max_cost } else { 0.0 };

                SMART_SUCCESS_WEIGHT * health.success_rate
                    + SMART_LATENCY_WEIGHT * (1.0 - latency_norm)
                    + SMART_COST_WEIGHT * (1.0 - cost_norm)
            })
            .collect()
    }
}

impl FallbackStrategy for Smart {
    fn order(&self, candidates: &[BackendDescriptor]) -> Vec<BackendDescriptor> {
        let scores = self.scores(candidates);
        let mut indexed: Vec<usize> = (0..candidates.len()).collect();
        // Stable sort: equal scores keep configured order.
        indexed.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        indexed.into_iter().map(|i| candidates[i].clone()).collect()
    }

    fn kind(&self) -> FallbackStrategyKind {
        FallbackStrategyKind::Smart
    }
}
