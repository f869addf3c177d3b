//! Prelude module for convenient imports.
//!
//! Re-exports the surface a host process typically needs to configure and
//! drive a router.
//!
//! # Usage
//!
//! ```rust
//! use model_router::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::Result;
pub use crate::Router;
pub use crate::RouterBuilder;

// Backend seam
pub use crate::backend::{BackendDescriptor, BackendInvoker, BackendResponse, Usage};

// Model descriptors
pub use crate::models::{ModelLimits, ModelPricing, PricingTable};

// Budgets
pub use crate::budget::{BudgetConfig, BudgetPeriod};

// Strategies
pub use crate::strategy::FallbackStrategyKind;

// Events
pub use crate::router::{FallbackEvent, FallbackReason};
