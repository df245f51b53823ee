//! Stability AI adapter
//!
//! Text-to-image over the v1 generation endpoint. The backend returns
//! base64 artifacts; the adapter wraps the first one as a data URL so the
//! normalized payload stays a reference the caller can store.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{
    map_http_error, map_transport_error, param_str, retry_after_seconds, GenerationProvider,
};
use crate::core::types::{GenerationContent, ProviderError, ProviderOutput, UsageUnits};

const PROVIDER: &str = "stability";
const DEFAULT_BASE_URL: &str = "https://api.stability.ai";

const MODELS: &[&str] = &["stable-diffusion-xl", "stable-diffusion-v1-6"];

/// Routing model ids map onto Stability engine ids
fn engine_id(model: &str) -> &str {
    match model {
        "stable-diffusion-xl" => "stable-diffusion-xl-1024-v1-0",
        "stable-diffusion-v1-6" => "stable-diffusion-v1-6",
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct StabilityProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl StabilityProvider {
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

fn dimensions(size: &str) -> (u32, u32) {
    size.split_once('x')
        .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
        .unwrap_or((1024, 1024))
}

#[async_trait]
impl GenerationProvider for StabilityProvider {
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

        let (width, height) = dimensions(&param_str(params, "size", "1024x1024"));
        let body = json!({
            "text_prompts": [{"text": prompt}],
            "width": width,
            "height": height,
            "samples": 1,
        });

        let url = format!(
            "{}/v1/generation/{}/text-to-image",
            self.base_url.trim_end_matches('/'),
            engine_id(model)
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
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

        let generation: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::remote(PROVIDER, format!("malformed response: {e}")))?;

        let artifact = generation.artifacts.into_iter().next().ok_or_else(|| {
            ProviderError::remote(PROVIDER, "generation response contained no artifacts")
        })?;

        Ok(ProviderOutput {
            content: GenerationContent::Image {
                url: format!("data:image/png;base64,{}", artifact.base64),
                revised_prompt: None,
            },
            usage: UsageUnits::items(1),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    base64: String,
}
