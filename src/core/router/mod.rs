//! Router dispatch
//!
//! Resolves a request to its adapter, invokes it exactly once under a
//! caller-visible timeout, and times the call. No automatic retry: remote
//! generation is generally non-idempotent, and retrying a paid external
//! call that may have partially succeeded risks double billing. Retry
//! policy belongs to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::providers::{GenerationProvider, ProviderRegistry};
use crate::core::streaming::ChunkSink;
use crate::core::types::{GenerationRequest, NormalizedResult, ProviderError};

/// Result of one dispatch attempt plus the wall-clock time it took.
/// Elapsed time is measured from adapter invocation to return, success or
/// failure, so failed attempts are recorded with their real duration.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub result: Result<NormalizedResult, ProviderError>,
    pub elapsed_seconds: f64,
}

pub struct RouterDispatch {
    registry: Arc<ProviderRegistry>,
    request_timeout: Duration,
}

impl RouterDispatch {
    pub fn new(registry: Arc<ProviderRegistry>, request_timeout: Duration) -> Self {
        Self {
            registry,
            request_timeout,
        }
    }

    /// Resolve the request to an adapter, or fail before any remote call
    /// is attempted. Rejections here incur no cost and record no time.
    pub fn resolve(
        &self,
        request: &GenerationRequest,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        let provider = self.registry.get(&request.provider).ok_or_else(|| {
            ProviderError::unsupported(format!("unknown provider '{}'", request.provider))
        })?;
        if !provider.is_configured() {
            return Err(ProviderError::unconfigured(provider.name()));
        }
        if !provider.supports_model(&request.model) {
            return Err(ProviderError::unsupported(format!(
                "model '{}' not offered by provider '{}'",
                request.model, request.provider
            )));
        }
        Ok(provider)
    }

    /// Single timed attempt against an already-resolved adapter
    pub async fn execute(
        &self,
        provider: &Arc<dyn GenerationProvider>,
        request: &GenerationRequest,
        chunks: Option<&ChunkSink>,
    ) -> DispatchOutcome {
        let started = Instant::now();
        let call = async {
            match chunks {
                Some(sink) => {
                    provider
                        .generate_streaming(&request.model, &request.prompt, &request.parameters, sink)
                        .await
                }
                None => {
                    provider
                        .generate(&request.model, &request.prompt, &request.parameters)
                        .await
                }
            }
        };

        let outcome = timeout(self.request_timeout, call).await;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(Ok(output)) => {
                debug!(
                    provider = %request.provider,
                    model = %request.model,
                    elapsed_seconds,
                    units = output.usage.total_units,
                    "generation completed"
                );
                Ok(NormalizedResult {
                    content: output.content,
                    usage: output.usage,
                    provider: request.provider.clone(),
                    model: request.model.clone(),
                    elapsed_seconds,
                    timestamp: Utc::now(),
                })
            }
            Ok(Err(err)) => {
                warn!(
                    provider = %request.provider,
                    model = %request.model,
                    elapsed_seconds,
                    error = %err,
                    "generation failed"
                );
                Err(err)
            }
            Err(_) => {
                warn!(
                    provider = %request.provider,
                    model = %request.model,
                    elapsed_seconds,
                    "generation timed out"
                );
                Err(ProviderError::timeout(provider.name(), elapsed_seconds))
            }
        };

        DispatchOutcome {
            result,
            elapsed_seconds,
        }
    }

    /// Resolve and execute in one step
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<NormalizedResult, ProviderError> {
        let provider = self.resolve(request)?;
        self.execute(&provider, request, None).await.result
    }
}
