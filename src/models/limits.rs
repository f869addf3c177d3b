use serde::{Deserialize, Serialize};

/// Provider-published limits for one backend model.
///
/// One immutable instance per configured backend; the router and scheduler
/// never mutate these after `build()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    pub provider: String,
    pub model_name: String,
    pub requests_per_minute: u64,
    pub tokens_per_minute: u64,
    pub max_context_tokens: u64,
}

impl ModelLimits {
    pub fn new(
        provider: impl Into<String>,
        model_name: impl Into<String>,
        requests_per_minute: u64,
        tokens_per_minute: u64,
        max_context_tokens: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model_name: model_name.into(),
            requests_per_minute,
            tokens_per_minute,
            max_context_tokens,
        }
    }

    /// Ledger key for this backend. Limits are scoped per provider+model,
    /// never shared across backends.
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider, self.model_name)
    }

    /// Minimum spacing between requests that smooths bursts across the
    /// window instead of letting them land at one instant.
    pub fn min_spacing(&self) -> std::time::Duration {
        if self.requests_per_minute == 0 {
            return std::time::Duration::from_secs(60);
        }
        std::time::Duration::from_secs_f64(60.0 / self.requests_per_minute as f64)
    }
}
