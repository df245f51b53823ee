//! OpenAI adapter
//!
//! Serves both text models (chat completions, token usage) and `dall-e*`
//! image models (one billable item per generation). Text models stream
//! incrementally over SSE; image models deliver their reference URL as a
//! single chunk.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use super::{
    map_http_error, map_transport_error, param_f64, param_str, param_u64, retry_after_seconds,
    GenerationProvider,
};
use crate::core::streaming::ChunkSink;
use crate::core::types::{GenerationContent, ProviderError, ProviderOutput, UsageUnits};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const TEXT_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini"];
const IMAGE_MODELS: &[&str] = &["dall-e-3", "dall-e-2"];

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
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

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::unconfigured(PROVIDER))
    }

    fn chat_body(model: &str, prompt: &str, params: &HashMap<String, Value>) -> Value {
        json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": param_u64(params, "max_tokens", 1000),
            "temperature": param_f64(params, "temperature", 0.7),
            "top_p": param_f64(params, "top_p", 1.0),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let key = self.key()?;
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = retry_after_seconds(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(PROVIDER, status, retry_after, &body));
        }
        Ok(response)
    }

    async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ProviderOutput, ProviderError> {
        let body = Self::chat_body(model, prompt, params);
        let response = self.post("/v1/chat/completions", &body).await?;
        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ProviderError::remote(PROVIDER, format!("malformed response: {e}")))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = completion
            .usage
            .map(|u| UsageUnits::tokens(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(ProviderOutput {
            content: GenerationContent::Text { text },
            usage,
        })
    }

    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ProviderOutput, ProviderError> {
        let body = json!({
            "model": model,
            "prompt": prompt,
            "size": param_str(params, "size", "1024x1024"),
            "quality": param_str(params, "quality", "standard"),
            "n": 1,
        });
        let response = self.post("/v1/images/generations", &body).await?;
        let images: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::remote(PROVIDER, format!("malformed response: {e}")))?;

        let image = images
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::remote(PROVIDER, "image response contained no data"))?;
        let url = image
            .url
            .ok_or_else(|| ProviderError::remote(PROVIDER, "image response contained no url"))?;

        Ok(ProviderOutput {
            content: GenerationContent::Image {
                url,
                revised_prompt: image.revised_prompt,
            },
            usage: UsageUnits::items(1),
        })
    }

    async fn stream_text(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
        chunks: &ChunkSink,
    ) -> Result<ProviderOutput, ProviderError> {
        let mut body = Self::chat_body(model, prompt, params);
        body["stream"] = json!(true);
        body["stream_options"] = json!({"include_usage": true});

        let response = self.post("/v1/chat/completions", &body).await?;
        let mut byte_stream = response.bytes_stream();

        let mut buf = String::new();
        let mut text = String::new();
        let mut usage: Option<UsageUnits> = None;

        while let Some(bytes) = byte_stream.next().await {
            let bytes = bytes.map_err(|e| map_transport_error(PROVIDER, e))?;
            buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim().to_string();
                buf.drain(..=pos);
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    continue;
                }
                let Ok(frame) = serde_json::from_str::<Value>(data) else {
                    debug!(provider = PROVIDER, "skipping unparseable stream frame");
                    continue;
                };
                if let Some(delta) = frame["choices"][0]["delta"]["content"].as_str() {
                    text.push_str(delta);
                    chunks.send(delta).await;
                }
                let frame_usage = &frame["usage"];
                if !frame_usage.is_null() {
                    usage = Some(UsageUnits::tokens(
                        frame_usage["prompt_tokens"].as_u64().unwrap_or(0),
                        frame_usage["completion_tokens"].as_u64().unwrap_or(0),
                    ));
                }
            }
        }

        // Older backends omit the usage frame; fall back to a length
        // heuristic so the result is still billable.
        let usage = usage.unwrap_or_else(|| {
            UsageUnits::tokens(
                (prompt.len() as u64).div_ceil(4),
                (text.len() as u64).div_ceil(4),
            )
        });

        Ok(ProviderOutput {
            content: GenerationContent::Text { text },
            usage,
        })
    }
}

fn is_image_model(model: &str) -> bool {
    model.starts_with("dall-e")
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn supports_model(&self, model: &str) -> bool {
        TEXT_MODELS.contains(&model) || IMAGE_MODELS.contains(&model)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
    ) -> Result<ProviderOutput, ProviderError> {
        if is_image_model(model) {
            self.generate_image(model, prompt, params).await
        } else {
            self.generate_text(model, prompt, params).await
        }
    }

    async fn generate_streaming(
        &self,
        model: &str,
        prompt: &str,
        params: &HashMap<String, Value>,
        chunks: &ChunkSink,
    ) -> Result<ProviderOutput, ProviderError> {
        if is_image_model(model) {
            let output = self.generate_image(model, prompt, params).await?;
            chunks.send(output.content.payload()).await;
            Ok(output)
        } else {
            self.stream_text(model, prompt, params, chunks).await
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
    revised_prompt: Option<String>,
}
