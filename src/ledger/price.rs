use std::collections::HashMap;

use crate::constants::DEFAULT_LLM_MODEL;
use crate::provider::TokenUsage;

/// USD per one million tokens, input and output priced separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Per-model price list. Models without an entry are priced as `fallback_model`.
#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
    fallback_model: String,
}

impl PriceTable {
    pub fn empty(fallback_model: impl Into<String>) -> Self {
        Self {
            prices: HashMap::new(),
            fallback_model: fallback_model.into(),
        }
    }

    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model.into(), price);
        self
    }

    pub fn set_fallback_model(&mut self, model: impl Into<String>) {
        self.fallback_model = model.into();
    }

    pub fn price(&self, model: &str) -> Option<ModelPrice> {
        self.prices
            .get(model)
            .or_else(|| self.prices.get(&self.fallback_model))
            .copied()
    }

    /// Cost in USD; zero when neither the model nor the fallback is listed.
    pub fn cost(&self, model: &str, usage: TokenUsage) -> f64 {
        self.price(model).map(|p| p.cost(usage)).unwrap_or(0.0)
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::empty(DEFAULT_LLM_MODEL)
            .with_price("gpt-4o-mini", ModelPrice::new(0.15, 0.60))
            .with_price("gpt-4o", ModelPrice::new(2.50, 10.00))
            .with_price("text-embedding-3-small", ModelPrice::new(0.02, 0.0))
    }
}
