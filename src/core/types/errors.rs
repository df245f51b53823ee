//! Provider-side error taxonomy
//!
//! Every failure a caller can see maps into exactly one of these variants.
//! Raw backend errors (reqwest, serde, HTTP bodies) never cross an adapter
//! boundary; adapters classify them here so callers can decide retry versus
//! surface-to-user without knowing which backend was involved.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The adapter exists but has no credentials. Checked synchronously
    /// before any network I/O.
    #[error("provider '{provider}' is not configured")]
    Unconfigured { provider: String },

    /// Unknown provider, or a model the resolved provider does not offer
    #[error("unsupported: {what}")]
    Unsupported { what: String },

    /// Raised by the credit ledger before any remote call is attempted
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredit { required: i64, available: i64 },

    /// The backend rejected the call for quota reasons
    #[error("rate limited by '{provider}'")]
    RateLimited {
        provider: String,
        /// Seconds to wait, when the backend said so
        retry_after: Option<u64>,
    },

    /// The call exceeded the dispatch timeout
    #[error("request to '{provider}' timed out after {elapsed:.1}s")]
    Timeout { provider: String, elapsed: f64 },

    /// Any other backend-side failure, with the backend's message
    #[error("remote failure from '{provider}': {message}")]
    RemoteFailure { provider: String, message: String },
}

impl ProviderError {
    pub fn unconfigured(provider: impl Into<String>) -> Self {
        ProviderError::Unconfigured {
            provider: provider.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        ProviderError::Unsupported { what: what.into() }
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        ProviderError::RateLimited {
            provider: provider.into(),
            retry_after,
        }
    }

    pub fn timeout(provider: impl Into<String>, elapsed: f64) -> Self {
        ProviderError::Timeout {
            provider: provider.into(),
            elapsed,
        }
    }

    pub fn remote(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::RemoteFailure {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether a caller could reasonably retry the same request.
    /// `Unconfigured` and `Unsupported` are terminal; `InsufficientCredit`
    /// only clears after a top-up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::RemoteFailure { .. }
        )
    }

    /// Stable identifier used in usage records and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unconfigured { .. } => "unconfigured",
            ProviderError::Unsupported { .. } => "unsupported",
            ProviderError::InsufficientCredit { .. } => "insufficient_credit",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::RemoteFailure { .. } => "remote_failure",
        }
    }
}
