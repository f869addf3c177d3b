//! Cost budgets: per-period spend tracking with hard and soft limits.

mod enforcer;
mod period;

pub use enforcer::{BudgetEnforcer, PeriodStatus};
pub use period::{BudgetConfig, BudgetPeriod, DEFAULT_WARNING_THRESHOLD};
