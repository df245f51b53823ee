//! ElevenLabs adapter
//!
//! Voice synthesis. The backend answers with raw audio bytes but records
//! the generation in the caller's history; the adapter turns the
//! `history-item-id` response header into a stable audio reference URL and
//! bills by character count of the synthesized text.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{
    map_http_error, map_transport_error, param_f64, param_str, retry_after_seconds,
    GenerationProvider,
};
use crate::core::types::{GenerationContent, ProviderError, ProviderOutput, UsageUnits};

const PROVIDER: &str = "elevenlabs";
const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

const MODELS: &[&str] = &["eleven-labs-v2", "eleven_multilingual_v2"];

/// Routing model ids map onto ElevenLabs model ids
fn model_id(model: &str) -> &str {
    match model {
        "eleven-labs-v2" => "eleven_multilingual_v2",
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct ElevenLabsProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl ElevenLabsProvider {
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
impl GenerationProvider for ElevenLabsProvider {
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

        let voice_id = param_str(params, "voice_id", DEFAULT_VOICE_ID);
        let body = json!({
            "text": prompt,
            "model_id": model_id(model),
            "voice_settings": {
                "stability": param_f64(params, "stability", 0.5),
                "similarity_boost": param_f64(params, "similarity_boost", 0.75),
            },
        });

        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/v1/text-to-speech/{voice_id}");
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", key)
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

        let history_item_id = response
            .headers()
            .get("history-item-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::remote(PROVIDER, "response carried no history-item-id")
            })?;

        // Drain the audio body; the caller fetches it from history.
        let _ = response.bytes().await;

        Ok(ProviderOutput {
            content: GenerationContent::Audio {
                url: format!("{base}/v1/history/{history_item_id}/audio"),
            },
            usage: UsageUnits::characters(prompt.chars().count() as u64),
        })
    }
}
