//! Crate-level error type
//!
//! `GatewayError` is what the public operations return. It keeps the
//! provider-side taxonomy intact so callers can tell billing-relevant
//! failures apart from infrastructure faults.

use crate::core::types::errors::ProviderError;
use crate::storage::StoreError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider-side failures, surfaced verbatim
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persistence collaborator failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// The provider error inside, if this is one.
    pub fn as_provider(&self) -> Option<&ProviderError> {
        match self {
            GatewayError::Provider(err) => Some(err),
            _ => None,
        }
    }
}
