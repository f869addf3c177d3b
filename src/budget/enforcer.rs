//! Multi-period spend tracking and enforcement.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::period::{BudgetConfig, BudgetPeriod};
use crate::{Error, Result};

#[derive(Debug)]
struct PeriodState {
    config: BudgetConfig,
    spent: f64,
    last_reset: DateTime<Utc>,
    warned: bool,
}

impl PeriodState {
    fn maybe_reset(&mut self, now: DateTime<Utc>) {
        let Some(length) = self.config.period.length() else {
            return;
        };
        if now.signed_duration_since(self.last_reset) >= length {
            tracing::debug!(
                period = %self.config.period,
                spent = self.spent,
                "budget period boundary elapsed, resetting"
            );
            self.spent = 0.0;
            self.warned = false;
            self.last_reset = now;
        }
    }
}

/// Introspection snapshot for one period.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PeriodStatus {
    pub budget: f64,
    pub spent: f64,
    pub remaining: f64,
    pub percentage: f64,
}

/// Tracks cumulative spend per configured period and enforces hard limits.
///
/// Period totals aggregate across all backends, so the period table sits
/// behind one lock; per-model sub-totals are keyed separately and never
/// contend across models.
#[derive(Debug, Default)]
pub struct BudgetEnforcer {
    periods: Mutex<BTreeMap<BudgetPeriod, PeriodState>>,
    per_model: DashMap<String, f64>,
}

impl BudgetEnforcer {
    pub fn new(configs: impl IntoIterator<Item = BudgetConfig>) -> Result<Self> {
        let now = Utc::now();
        let mut periods = BTreeMap::new();
        for config in configs {
            config.validate().map_err(Error::Config)?;
            periods.insert(
                config.period,
                PeriodState {
                    config,
                    spent: 0.0,
                    last_reset: now,
                    warned: false,
                },
            );
        }
        Ok(Self {
            periods: Mutex::new(periods),
            per_model: DashMap::new(),
        })
    }

    /// Whether any period is configured at all. An unconfigured enforcer
    /// affords everything and records only per-model sub-totals.
    pub fn is_configured(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Record spend that already happened. Elapsed periods reset first,
    /// then every configured period total (and the per-model total) grows
    /// by `amount`. Errors when a hard-limited period is now over budget;
    /// the spend stays recorded either way.
    pub fn record_cost(&self, amount: f64, model_key: Option<&str>) -> Result<()> {
        self.record_cost_at(amount, model_key, Utc::now())
    }

    pub(crate) fn record_cost_at(
        &self,
        amount: f64,
        model_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(key) = model_key {
            *self.per_model.entry(key.to_string()).or_insert(0.0) += amount;
        }

        let mut exceeded = None;
        {
            let mut periods = self.lock();
            for state in periods.values_mut() {
                state.maybe_reset(now);
                state.spent += amount;

                let budget = state.config.amount;
                if !state.warned && state.spent >= budget * state.config.warning_threshold {
                    state.warned = true;
                    tracing::warn!(
                        period = %state.config.period,
                        spent = state.spent,
                        budget,
                        "budget warning threshold crossed"
                    );
                }

                if state.config.hard_limit && state.spent > budget && exceeded.is_none() {
                    exceeded = Some(Error::BudgetExceeded {
                        budget,
                        spent: state.spent,
                        period: state.config.period,
                    });
                }
            }
        }

        match exceeded {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether `amount` more spend would stay within budget. Soft-limit
    /// periods always afford; `period = None` checks every configured one.
    pub fn can_afford(&self, amount: f64, period: Option<BudgetPeriod>) -> bool {
        self.can_afford_at(amount, period, Utc::now())
    }

    pub(crate) fn can_afford_at(
        &self,
        amount: f64,
        period: Option<BudgetPeriod>,
        now: DateTime<Utc>,
    ) -> bool {
        self.blocking_period_at(amount, period, now).is_none()
    }

    /// The first hard-limited period that cannot absorb `amount` more
    /// spend, with its budget and running total.
    pub(crate) fn blocking_period(
        &self,
        amount: f64,
        period: Option<BudgetPeriod>,
    ) -> Option<(BudgetPeriod, f64, f64)> {
        self.blocking_period_at(amount, period, Utc::now())
    }

    pub(crate) fn blocking_period_at(
        &self,
        amount: f64,
        period: Option<BudgetPeriod>,
        now: DateTime<Utc>,
    ) -> Option<(BudgetPeriod, f64, f64)> {
        let mut periods = self.lock();
        for state in periods.values_mut() {
            if let Some(wanted) = period
                && state.config.period != wanted
            {
                continue;
            }
            state.maybe_reset(now);
            if state.config.hard_limit && state.spent + amount > state.config.amount {
                return Some((state.config.period, state.config.amount, state.spent));
            }
        }
        None
    }

    /// Running total for `period`, 0.0 when unconfigured.
    pub fn spent(&self, period: BudgetPeriod) -> f64 {
        self.spent_at(period, Utc::now())
    }

    pub(crate) fn spent_at(&self, period: BudgetPeriod, now: DateTime<Utc>) -> f64 {
        let mut periods = self.lock();
        periods
            .get_mut(&period)
            .map(|state| {
                state.maybe_reset(now);
                state.spent
            })
            .unwrap_or(0.0)
    }

    /// Remaining headroom for `period`: unbounded when unconfigured, zero
    /// once exceeded.
    pub fn remaining(&self, period: BudgetPeriod) -> f64 {
        let mut periods = self.lock();
        periods
            .get_mut(&period)
            .map(|state| {
                state.maybe_reset(Utc::now());
                (state.config.amount - state.spent).max(0.0)
            })
            .unwrap_or(f64::INFINITY)
    }

    /// Per-period snapshot for introspection endpoints.
    pub fn status(&self) -> BTreeMap<BudgetPeriod, PeriodStatus> {
        let now = Utc::now();
        let mut periods = self.lock();
        periods
            .iter_mut()
            .map(|(period, state)| {
                state.maybe_reset(now);
                let budget = state.config.amount;
                (
                    *period,
                    PeriodStatus {
                        budget,
                        spent: state.spent,
                        remaining: (budget - state.spent).max(0.0),
                        percentage: if budget > 0.0 {
                            (state.spent / budget) * 100.0
                        } else {
                            0.0
                        },
                    },
                )
            })
            .collect()
    }

    /// Cumulative spend attributed to one backend.
    pub fn model_spend(&self, model_key: &str) -> f64 {
        self.per_model.get(model_key).map(|v| *v).unwrap_or(0.0)
    }

    /// Manual reset; `None` resets every period including `Total`.
    pub fn reset(&self, period: Option<BudgetPeriod>) {
        let now = Utc::now();
        let mut periods = self.lock();
        for state in periods.values_mut() {
            if period.is_none() || period == Some(state.config.period) {
                state.spent = 0.0;
                state.warned = false;
                state.last_reset = now;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<BudgetPeriod, PeriodState>> {
        self.periods.lock().unwrap_or_else(|e| e.into_inner())
    }
}
