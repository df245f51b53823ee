//! Anthropic adapter
//!
//! Messages API. Anthropic authenticates with an `x-api-key` header plus a
//! pinned `anthropic-version`, and reports usage as separate input/output
//! token counts.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{
    map_http_error, map_transport_error, param_f64, param_u64, retry_after_seconds,
    GenerationProvider,
};
use crate::core::types::{GenerationContent, ProviderError, ProviderOutput, UsageUnits};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

const MODELS: &[&str] = &[
    "claude-3.5-sonnet",
    "claude-3-5-sonnet-20241022",
    "claude-3-haiku-20240307",
];

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl GenerationProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn supports_model(&self, model: &str) -> bool {
        MODELS.contains(&model)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ProviderOutput, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::unconfigured(PROVIDER))?;

        let body = json!({
            "model": model,
            "max_tokens": param_u64(params, "max_tokens", 1000),
            "temperature": param_f64(params, "temperature", 0.7),
            "messages": [{"role": "user", "content": prompt}],
        });

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = retry_after_seconds(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER, status, retry_after, &body));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::remote(PROVIDER, format!("malformed response: {e}")))?;

        let text = message
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ProviderOutput {
            content: GenerationContent::Text { text },
            usage: UsageUnits::tokens(message.usage.input_tokens, message.usage.output_tokens),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: MessageUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageUsage {
    input_tokens: u64,
    output_tokens: u64,
}
