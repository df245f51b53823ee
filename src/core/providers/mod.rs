//! Provider adapters
//!
//! One adapter per third-party backend. Each owns its protocol-specific
//! request/response translation and nothing else: the only types that
//! cross an adapter's boundary are [`ProviderOutput`] and
//! [`ProviderError`].

pub mod anthropic;
pub mod elevenlabs;
pub mod gemini;
pub mod openai;
pub mod registry;
pub mod stability;

pub use anthropic::AnthropicProvider;
pub use elevenlabs::ElevenLabsProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
pub use stability::StabilityProvider;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::core::streaming::ChunkSink;
use crate::core::types::{ProviderError, ProviderOutput};

/// Capability shared by every backend adapter
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Routing identifier, unique across the registry
    fn name(&self) -> &'static str;

    /// Credential presence. Cheap and synchronous; an unconfigured adapter
    /// fails fast without attempting any network I/O.
    fn is_configured(&self) -> bool;

    /// Whether this adapter offers the model
    fn supports_model(&self, model: &str) -> bool;

    /// One generation attempt. Applies backend-appropriate defaults for
    /// absent parameters and normalizes the backend's response shape.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ProviderOutput, ProviderError>;

    /// Incremental variant. Backends without true streaming deliver the
    /// complete payload as a single chunk; either way the returned output
    /// equals what [`generate`](Self::generate) would have produced.
    async fn generate_streaming(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
        chunks: &ChunkSink,
    ) -> Result<ProviderOutput, ProviderError> {
        let output = self.generate(model, prompt, params).await?;
        chunks.send(output.content.payload()).await;
        Ok(output)
    }
}

/// Classify a non-success HTTP status into the shared taxonomy
pub(crate) fn map_http_error(
    provider: &str,
    status: u16,
    retry_after: Option<u64>,
    body: &str,
) -> ProviderError {
    match status {
        429 => ProviderError::rate_limited(provider, retry_after),
        _ => ProviderError::remote(provider, format!("HTTP {status}: {body}")),
    }
}

/// Classify a transport-level failure
pub(crate) fn map_transport_error(provider: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(provider, 0.0)
    } else {
        ProviderError::remote(provider, err.to_string())
    }
}

/// Integer parameter with a backend default
pub(crate) fn param_u64(params: &HashMap<String, Value>, name: &str, default: u64) -> u64 {
    params.get(name).and_then(Value::as_u64).unwrap_or(default)
}

/// Float parameter with a backend default
pub(crate) fn param_f64(params: &HashMap<String, Value>, name: &str, default: f64) -> f64 {
    params.get(name).and_then(Value::as_f64).unwrap_or(default)
}

/// String parameter with a backend default
pub(crate) fn param_str(params: &HashMap<String, Value>, name: &str, default: &str) -> String {
    params
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Retry-After header as whole seconds, when present and parseable
pub(crate) fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
