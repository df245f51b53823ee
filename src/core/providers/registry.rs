//! Provider registry
//!
//! Identifier -> adapter mapping, resolved once at startup. Keeps
//! providers pluggable without any runtime type inspection: the router
//! only ever sees `Arc<dyn GenerationProvider>`.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::{
    AnthropicProvider, ElevenLabsProvider, GeminiProvider, GenerationProvider, OpenAiProvider,
    StabilityProvider,
};
use crate::config::ProviderCredentials;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stock adapters, credentialed from configuration. Adapters with
    /// absent credentials are still registered so they can report
    /// `not_configured` instead of `unknown`.
    pub fn from_credentials(credentials: &ProviderCredentials) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiProvider::new(
            credentials.openai_api_key.clone(),
        )));
        registry.register(Arc::new(AnthropicProvider::new(
            credentials.anthropic_api_key.clone(),
        )));
        registry.register(Arc::new(GeminiProvider::new(
            credentials.google_api_key.clone(),
        )));
        registry.register(Arc::new(StabilityProvider::new(
            credentials.stability_api_key.clone(),
        )));
        registry.register(Arc::new(ElevenLabsProvider::new(
            credentials.elevenlabs_api_key.clone(),
        )));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn GenerationProvider>) {
        info!(
            provider = provider.name(),
            configured = provider.is_configured(),
            "provider registered"
        );
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn GenerationProvider>)> {
        self.providers
            .iter()
            .map(|(name, provider)| (name.as_str(), provider))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
