//! Gateway configuration
//!
//! Loaded once at process start, from a YAML file or from the
//! environment. Credential presence or absence here is what decides
//! whether an adapter reports `not_configured`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::utils::error::{GatewayError, Result};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;

/// Per-provider API secrets. An absent secret leaves that adapter
/// registered but unconfigured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderCredentials {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub stability_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
}

impl ProviderCredentials {
    /// Read secrets from the environment, honoring a `.env` file when
    /// present
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            openai_api_key: env_var("OPENAI_API_KEY"),
            anthropic_api_key: env_var("ANTHROPIC_API_KEY"),
            google_api_key: env_var("GOOGLE_AI_KEY"),
            stability_api_key: env_var("STABILITY_API_KEY"),
            elevenlabs_api_key: env_var("ELEVENLABS_API_KEY"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Caller-visible ceiling on a single generation attempt
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval for background health sampling
    #[serde(default = "default_health_interval_secs")]
    pub health_check_interval_secs: u64,

    #[serde(default)]
    pub credentials: ProviderCredentials,

    /// Optional YAML pricing overlay merged over the builtin table
    #[serde(default)]
    pub pricing_overlay: Option<PathBuf>,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_health_interval_secs() -> u64 {
    DEFAULT_HEALTH_INTERVAL_SECS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            health_check_interval_secs: DEFAULT_HEALTH_INTERVAL_SECS,
            credentials: ProviderCredentials::default(),
            pricing_overlay: None,
        }
    }
}

impl GatewayConfig {
    /// Load from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("failed to read config file: {e}")))?;
        let config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("failed to parse config: {e}")))?;

        config.validate()?;
        debug!("configuration loaded");
        Ok(config)
    }

    /// Build from environment variables, with defaults for everything but
    /// credentials
    pub fn from_env() -> Result<Self> {
        let credentials = ProviderCredentials::from_env();
        let request_timeout_secs = match std::env::var("GENROUTE_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw.parse().map_err(|_| {
                GatewayError::Config(format!("invalid GENROUTE_REQUEST_TIMEOUT_SECS: {raw}"))
            })?,
            Err(_) => DEFAULT_REQUEST_TIMEOUT_SECS,
        };
        let config = Self {
            request_timeout_secs,
            credentials,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.health_check_interval_secs == 0 {
            return Err(GatewayError::Config(
                "health_check_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
        assert!(config.credentials.openai_api_key.is_none());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = GatewayConfig {
            request_timeout_secs: 0,
            ..GatewayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn yaml_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            concat!(
                "request_timeout_secs: 60\n",
                "credentials:\n",
                "  openai_api_key: sk-test\n",
            )
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).await.unwrap();
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.health_check_interval_secs, 30);
        assert_eq!(config.credentials.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.credentials.anthropic_api_key, None);
    }

    #[tokio::test]
    async fn malformed_yaml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_secs: [not a number]").unwrap();
        let err = GatewayConfig::from_file(file.path()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
