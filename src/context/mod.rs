//! Context-window fit checks and escalation.
//!
//! Token counts are approximated before the call is made, so the policy
//! only needs a stable, monotonic estimate, not an exact tokenizer. The
//! escalation path tries candidates smallest-sufficient-first: the point is
//! to find the cheapest backend whose window holds the input, not the
//! biggest one available.

use crate::backend::BackendDescriptor;
use crate::{Error, Result};

/// Heuristic divisor: roughly four characters of English text per token.
pub const DEFAULT_CHARS_PER_TOKEN: u32 = 4;

/// Result of checking one payload against one backend's window.
#[derive(Debug, Clone, Copy)]
pub struct FitCheck {
    pub fits: bool,
    pub estimated_tokens: u64,
    pub max_context: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextFitPolicy {
    chars_per_token: u32,
}

impl Default for ContextFitPolicy {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl ContextFitPolicy {
    pub fn new(chars_per_token: u32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    /// Deterministic, monotonic token estimate for `payload`.
    pub fn estimate_tokens(&self, payload: &str) -> u64 {
        (payload.chars().count() as u64).div_ceil(self.chars_per_token as u64)
    }

    pub fn fits(&self, payload: &str, backend: &BackendDescriptor) -> FitCheck {
        let estimated_tokens = self.estimate_tokens(payload);
        let max_context = backend.limits().max_context_tokens;
        FitCheck {
            fits: estimated_tokens <= max_context,
            estimated_tokens,
            max_context,
        }
    }

    /// First candidate, smallest window first, that can hold `payload`.
    ///
    /// Errors with the largest available window when none fit, so the
    /// caller can report how far short every configured backend fell.
    pub fn select_context_capable(
        &self,
        payload: &str,
        candidates: &[BackendDescriptor],
    ) -> Result<BackendDescriptor> {
        let estimated_tokens = self.estimate_tokens(payload);

        let mut by_window: Vec<&BackendDescriptor> = candidates.iter().collect();
        by_window.sort_by_key(|b| b.limits().max_context_tokens);

        for backend in &by_window {
            if estimated_tokens <= backend.limits().max_context_tokens {
                tracing::debug!(
                    model = %backend.model_name(),
                    estimated_tokens,
                    max_context = backend.limits().max_context_tokens,
                    "selected context-capable backend"
                );
                return Ok((*backend).clone());
            }
        }

        Err(Error::ContextTooLarge {
            estimated_tokens,
            max_context: by_window
                .last()
                .map(|b| b.limits().max_context_tokens)
                .unwrap_or(0),
        })
    }
}
