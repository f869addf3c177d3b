use serde::{Deserialize, Serialize};

/// Accounting periods a budget can be scoped to.
///
/// `Total` is the lifetime of the enforcer and never auto-resets; the
/// others reset lazily once their length has elapsed since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Hourly,
    Daily,
    Monthly,
    Total,
}

impl BudgetPeriod {
    pub const ALL: [BudgetPeriod; 4] = [Self::Hourly, Self::Daily, Self::Monthly, Self::Total];

    /// Period length, measured from the last reset. `None` for `Total`.
    pub fn length(&self) -> Option<chrono::Duration> {
        match self {
            Self::Hourly => Some(chrono::Duration::hours(1)),
            Self::Daily => Some(chrono::Duration::days(1)),
            Self::Monthly => Some(chrono::Duration::days(30)),
            Self::Total => None,
        }
    }
}

impl std::fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Total => "total",
        };
        f.write_str(name)
    }
}

pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;

/// Spend limit for one period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub amount: f64,
    pub period: BudgetPeriod,
    pub hard_limit: bool,
    pub warning_threshold: f64,
}

impl BudgetConfig {
    pub fn new(period: BudgetPeriod, amount: f64) -> Self {
        Self {
            amount,
            period,
            hard_limit: true,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }

    /// Track and warn without ever blocking spend.
    pub fn soft(mut self) -> Self {
        self.hard_limit = false;
        self
    }

    pub fn warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(format!(
                "budget amount for {} period must be a non-negative number, got {}",
                self.period, self.amount
            ));
        }
        if !(0.0..=1.0).contains(&self.warning_threshold) {
            return Err(format!(
                "warning threshold for {} period must be within [0, 1], got {}",
                self.period, self.warning_threshold
            ));
        }
        Ok(())
    }
}
