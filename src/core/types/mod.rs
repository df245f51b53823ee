//! Core domain types
//!
//! The request and the normalized result are the two shapes every caller and
//! every adapter agree on. Backend-specific response formats never leave the
//! adapter that produced them.

pub mod errors;

pub use errors::ProviderError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What kind of content a generation produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Audio,
}

/// A single generation request, immutable once constructed.
///
/// `user_id` is an already-authenticated identity supplied by the caller;
/// this core never authenticates on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub user_id: String,
}

impl GenerationRequest {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            parameters: HashMap::new(),
            user_id: user_id.into(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Integer parameter with a default. Absent or non-numeric values fall
    /// back to the default so `null` never reaches a remote call.
    pub fn param_u32(&self, name: &str, default: u32) -> u32 {
        self.parameters
            .get(name)
            .and_then(Value::as_u64)
            .map(|v| v.min(u32::MAX as u64) as u32)
            .unwrap_or(default)
    }

    /// Float parameter with a default
    pub fn param_f64(&self, name: &str, default: f64) -> f64 {
        self.parameters
            .get(name)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    /// String parameter with a default
    pub fn param_str(&self, name: &str, default: &str) -> String {
        self.parameters
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }
}

/// Billable usage of a single generation, in provider-specific units
/// (tokens, generated items, or characters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageUnits {
    pub input_units: u64,
    pub output_units: u64,
    pub total_units: u64,
}

impl UsageUnits {
    /// Token-based usage as reported by text backends
    pub fn tokens(input: u64, output: u64) -> Self {
        Self {
            input_units: input,
            output_units: output,
            total_units: input + output,
        }
    }

    /// Item-count usage for media backends
    pub fn items(count: u64) -> Self {
        Self {
            input_units: 0,
            output_units: count,
            total_units: count,
        }
    }

    /// Character-count usage for voice synthesis
    pub fn characters(count: u64) -> Self {
        Self {
            input_units: count,
            output_units: 0,
            total_units: count,
        }
    }
}

/// Generated content in its normalized shape: inline text, or a reference
/// URL for binary media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GenerationContent {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        revised_prompt: Option<String>,
    },
    Audio {
        url: String,
    },
}

impl GenerationContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            GenerationContent::Text { .. } => ContentKind::Text,
            GenerationContent::Image { .. } => ContentKind::Image,
            GenerationContent::Audio { .. } => ContentKind::Audio,
        }
    }

    /// The text payload, or the reference URL for media content
    pub fn payload(&self) -> &str {
        match self {
            GenerationContent::Text { text } => text,
            GenerationContent::Image { url, .. } => url,
            GenerationContent::Audio { url } => url,
        }
    }
}

/// What an adapter hands back: content plus usage. The router adds timing
/// and provenance to form the [`NormalizedResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub content: GenerationContent,
    pub usage: UsageUnits,
}

/// The single cross-provider response shape all callers consume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub content: GenerationContent,
    pub usage: UsageUnits,
    pub provider: String,
    pub model: String,
    pub elapsed_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl NormalizedResult {
    pub fn kind(&self) -> ContentKind {
        self.content.kind()
    }
}

/// Priced usage. Derived from a pricing lookup, never persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostQuote {
    /// Monetary cost in USD
    pub cost: f64,
    /// Whole credit units to debit
    pub credits: i64,
    pub billable_units: u64,
}
