//! Cost model
//!
//! A pure pricing lookup: (provider, model, usage) -> cost. The table is
//! static for the life of the process; unknown models fall back to a
//! provider-level rate and unknown providers to one global default, so a
//! missing price entry can never block billing.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::core::types::{CostQuote, GenerationRequest, UsageUnits};
use crate::utils::error::{GatewayError, Result};

/// How a model is billed
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelRate {
    /// Text backends: separate input/output token rates per thousand tokens
    PerToken {
        input_per_1k: f64,
        output_per_1k: f64,
    },
    /// Media backends: flat price per generated item
    PerItem { each: f64 },
    /// Voice synthesis: price per thousand characters
    PerCharacter { per_1k: f64 },
}

/// Optional YAML overlay loaded at process start
#[derive(Debug, Deserialize)]
struct PricingFile {
    #[serde(default)]
    models: HashMap<String, ModelRate>,
    #[serde(default)]
    provider_defaults: HashMap<String, ModelRate>,
    fallback: Option<ModelRate>,
}

/// Static per-model rate table with provider-level and global fallbacks
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelRate>,
    provider_defaults: HashMap<String, ModelRate>,
    fallback: ModelRate,
}

static BUILTIN: Lazy<PricingTable> = Lazy::new(|| {
    let mut models = HashMap::new();
    models.insert(
        "gpt-4o".to_string(),
        ModelRate::PerToken {
            input_per_1k: 0.03,
            output_per_1k: 0.03,
        },
    );
    models.insert(
        "gpt-4o-mini".to_string(),
        ModelRate::PerToken {
            input_per_1k: 0.015,
            output_per_1k: 0.015,
        },
    );
    models.insert(
        "claude-3.5-sonnet".to_string(),
        ModelRate::PerToken {
            input_per_1k: 0.03,
            output_per_1k: 0.03,
        },
    );
    models.insert(
        "gemini-pro".to_string(),
        ModelRate::PerToken {
            input_per_1k: 0.0125,
            output_per_1k: 0.0125,
        },
    );
    models.insert("dall-e-3".to_string(), ModelRate::PerItem { each: 0.04 });
    models.insert(
        "stable-diffusion-xl".to_string(),
        ModelRate::PerItem { each: 0.04 },
    );
    models.insert(
        "eleven-labs-v2".to_string(),
        ModelRate::PerCharacter { per_1k: 0.3 },
    );

    let mut provider_defaults = HashMap::new();
    provider_defaults.insert(
        "openai".to_string(),
        ModelRate::PerToken {
            input_per_1k: 0.03,
            output_per_1k: 0.03,
        },
    );
    provider_defaults.insert(
        "anthropic".to_string(),
        ModelRate::PerToken {
            input_per_1k: 0.03,
            output_per_1k: 0.03,
        },
    );
    provider_defaults.insert(
        "google".to_string(),
        ModelRate::PerToken {
            input_per_1k: 0.0125,
            output_per_1k: 0.0125,
        },
    );
    provider_defaults.insert("stability".to_string(), ModelRate::PerItem { each: 0.04 });
    provider_defaults.insert(
        "elevenlabs".to_string(),
        ModelRate::PerCharacter { per_1k: 0.3 },
    );

    PricingTable {
        models,
        provider_defaults,
        fallback: ModelRate::PerToken {
            input_per_1k: 0.02,
            output_per_1k: 0.02,
        },
    }
});

/// One credit is one cent of provider cost; a billed generation always
/// costs at least one credit.
pub fn credits_for_cost(cost: f64) -> i64 {
    ((cost * 100.0).ceil() as i64).max(1)
}

impl PricingTable {
    /// Built-in rates for the models the stock adapters serve
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Add or replace a single model entry
    pub fn with_model(mut self, model: impl Into<String>, rate: ModelRate) -> Self {
        self.models.insert(model.into(), rate);
        self
    }

    /// Merge a YAML overlay file on top of the current table
    pub fn with_overlay_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let file: PricingFile = serde_yaml::from_str(&content)?;
        self.models.extend(file.models);
        self.provider_defaults.extend(file.provider_defaults);
        if let Some(fallback) = file.fallback {
            self.fallback = fallback;
        }
        if self.models.is_empty() && self.provider_defaults.is_empty() {
            return Err(GatewayError::Config(format!(
                "pricing overlay {} contains no rates",
                path.as_ref().display()
            )));
        }
        Ok(self)
    }

    /// Rate for a model, falling back to the provider default and then the
    /// global default. Never fails.
    pub fn rate_for(&self, provider: &str, model: &str) -> ModelRate {
        self.models
            .get(model)
            .or_else(|| self.provider_defaults.get(provider))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Price actual usage. Pure: same inputs always yield the same quote.
    pub fn price(&self, provider: &str, model: &str, usage: &UsageUnits) -> CostQuote {
        let cost = match self.rate_for(provider, model) {
            ModelRate::PerToken {
                input_per_1k,
                output_per_1k,
            } => {
                (usage.input_units as f64 / 1000.0) * input_per_1k
                    + (usage.output_units as f64 / 1000.0) * output_per_1k
            }
            ModelRate::PerItem { each } => usage.total_units as f64 * each,
            ModelRate::PerCharacter { per_1k } => (usage.total_units as f64 / 1000.0) * per_1k,
        };
        CostQuote {
            cost,
            credits: credits_for_cost(cost),
            billable_units: usage.total_units,
        }
    }

    /// Conservative pre-call estimate used to size the reservation: the
    /// requested output ceiling for token billing, one item for media (the
    /// adapters generate exactly one per call), the prompt length for voice.
    pub fn estimate(&self, request: &GenerationRequest) -> CostQuote {
        let usage = match self.rate_for(&request.provider, &request.model) {
            ModelRate::PerToken { .. } => UsageUnits::tokens(
                (request.prompt.len() as u64).div_ceil(4),
                request.param_u32("max_tokens", 1000) as u64,
            ),
            ModelRate::PerItem { .. } => UsageUnits::items(1),
            ModelRate::PerCharacter { .. } => {
                UsageUnits::characters(request.prompt.chars().count() as u64)
            }
        };
        self.price(&request.provider, &request.model, &usage)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}
