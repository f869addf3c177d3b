//! The backend seam: what the router needs from a model service.
//!
//! The transport itself (HTTP, SDK, subprocess) lives with the host; the
//! router only requires the three accessors and an async invoke.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::ModelLimits;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Token counts a backend reports after a completed call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// A completed backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub text: String,
    pub usage: Usage,
}

/// Capability implemented by the host for each model service.
///
/// `provider` and `model_name` default to the limits' fields; implementors
/// only override them when the transport knows better.
#[async_trait]
pub trait BackendInvoker: Send + Sync {
    fn limits(&self) -> &ModelLimits;

    fn provider(&self) -> &str {
        &self.limits().provider
    }

    fn model_name(&self) -> &str {
        &self.limits().model_name
    }

    async fn invoke(&self, payload: &str) -> Result<BackendResponse, BoxError>;
}

/// Cheap-clone handle over a configured backend.
#[derive(Clone)]
pub struct BackendDescriptor {
    invoker: Arc<dyn BackendInvoker>,
}

impl BackendDescriptor {
    pub fn new(invoker: Arc<dyn BackendInvoker>) -> Self {
        Self { invoker }
    }

    pub fn provider(&self) -> &str {
        self.invoker.provider()
    }

    pub fn model_name(&self) -> &str {
        self.invoker.model_name()
    }

    pub fn limits(&self) -> &ModelLimits {
        self.invoker.limits()
    }

    /// Ledger key, matching `ModelLimits::key()`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider(), self.model_name())
    }

    pub async fn invoke(&self, payload: &str) -> Result<BackendResponse, BoxError> {
        self.invoker.invoke(payload).await
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("provider", &self.provider())
            .field("model_name", &self.model_name())
            .field("limits", self.limits())
            .finish()
    }
}

/// The configured primary backend and its ordered fallbacks.
#[derive(Debug, Clone)]
pub struct FallbackChain {
    primary: BackendDescriptor,
    fallbacks: Vec<BackendDescriptor>,
}

impl FallbackChain {
    pub fn new(primary: BackendDescriptor, fallbacks: Vec<BackendDescriptor>) -> Self {
        Self { primary, fallbacks }
    }

    pub fn primary(&self) -> &BackendDescriptor {
        &self.primary
    }

    pub fn fallbacks(&self) -> &[BackendDescriptor] {
        &self.fallbacks
    }

    /// Primary first, fallbacks in configured order: the Sequential
    /// strategy's input and output.
    pub fn candidates(&self) -> Vec<BackendDescriptor> {
        let mut all = Vec::with_capacity(1 + self.fallbacks.len());
        all.push(self.primary.clone());
        all.extend(self.fallbacks.iter().cloned());
        all
    }
}

/// Deterministic invokers for tests and examples.
pub mod testing {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    /// Scripted backend: always succeeds with a canned response, or always
    /// fails. Counts its invocations.
    pub struct StaticBackend {
        limits: ModelLimits,
        fail_message: Option<String>,
        usage: Usage,
        calls: AtomicU64,
    }

    impl StaticBackend {
        pub fn succeeding(limits: ModelLimits) -> Self {
            Self {
                limits,
                fail_message: None,
                usage: Usage::new(100, 50),
                calls: AtomicU64::new(0),
            }
        }

        pub fn failing(limits: ModelLimits, message: impl Into<String>) -> Self {
            Self {
                limits,
                fail_message: Some(message.into()),
                usage: Usage::default(),
                calls: AtomicU64::new(0),
            }
        }

        pub fn with_usage(mut self, usage: Usage) -> Self {
            self.usage = usage;
            self
        }

        pub fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendInvoker for StaticBackend {
        fn limits(&self) -> &ModelLimits {
            &self.limits
        }

        async fn invoke(&self, _payload: &str) -> Result<BackendResponse, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_message {
                Some(message) => Err(message.clone().into()),
                None => Ok(BackendResponse {
                    text: format!("{} response", self.limits.model_name),
                    usage: self.usage,
                }),
            }
        }
    }
}
