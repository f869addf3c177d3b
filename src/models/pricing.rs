//! Per-model pricing for cost calculation and ordering.
//!
//! Rates are dollars per million tokens. Unknown models fall back to the
//! table's default entry so cost accounting never silently drops spend.

use std::collections::HashMap;

use crate::backend::Usage;

/// Assumed output:input ratio when estimating the cost of a call before it
/// is made (the backend has not reported real usage yet).
const ESTIMATED_OUTPUT_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }

    /// Cost in dollars for actual reported usage.
    pub fn calculate(&self, usage: &Usage) -> f64 {
        let input = (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_mtok;
        let output = (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_mtok;
        input + output
    }

    /// Projected cost in dollars for a call with `estimated_tokens` of
    /// input, assuming output runs at half the input volume.
    pub fn estimate(&self, estimated_tokens: u64) -> f64 {
        let input = estimated_tokens as f64;
        let output = input * ESTIMATED_OUTPUT_RATIO;
        (input * self.input_per_mtok + output * self.output_per_mtok) / 1_000_000.0
    }

    /// Blended $/token under the same output ratio; the ordering metric for
    /// cost-optimized fallback.
    pub fn blended_per_token(&self) -> f64 {
        (self.input_per_mtok + self.output_per_mtok * ESTIMATED_OUTPUT_RATIO) / 1_000_000.0
    }
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    default: ModelPricing,
}

impl PricingTable {
    pub fn builder() -> PricingTableBuilder {
        PricingTableBuilder::new()
    }

    pub fn get(&self, model: &str) -> &ModelPricing {
        self.models.get(model).unwrap_or(&self.default)
    }

    pub fn calculate(&self, model: &str, usage: &Usage) -> f64 {
        self.get(model).calculate(usage)
    }

    pub fn estimate(&self, model: &str, estimated_tokens: u64) -> f64 {
        self.get(model).estimate(estimated_tokens)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        PricingTableBuilder::new().build()
    }
}

#[derive(Debug, Default)]
pub struct PricingTableBuilder {
    models: HashMap<String, ModelPricing>,
    default: Option<ModelPricing>,
}

impl PricingTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, name: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(name.into(), pricing);
        self
    }

    pub fn model_base(self, name: impl Into<String>, input: f64, output: f64) -> Self {
        self.model(name, ModelPricing::new(input, output))
    }

    pub fn default_pricing(mut self, pricing: ModelPricing) -> Self {
        self.default = Some(pricing);
        self
    }

    pub fn build(self) -> PricingTable {
        PricingTable {
            models: self.models,
            default: self.default.unwrap_or(ModelPricing::new(3.0, 15.0)),
        }
    }
}
