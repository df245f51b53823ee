//! Gateway facade
//!
//! One entry point per caller-visible operation: blocking generation,
//! streaming generation, and provider health. The facade owns the order of
//! the pipeline. Resolve the adapter, reserve estimated credits, dispatch,
//! then settle or release. Requests rejected before the reservation leave
//! no trace in the usage ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::core::cost::PricingTable;
use crate::core::health::{self, ProviderStatus};
use crate::core::ledger::{CreditLedger, Reservation};
use crate::core::providers::{GenerationProvider, ProviderRegistry};
use crate::core::router::{DispatchOutcome, RouterDispatch};
use crate::core::streaming::{chunk_bridge, StreamEvent};
use crate::core::types::{GenerationRequest, NormalizedResult};
use crate::storage::{CreditStore, UsageOutcome, UsageRecord};
use crate::utils::error::{GatewayError, Result};

use std::collections::HashMap;

/// Priced outcome of one generation, returned to the caller and mirrored
/// into the usage ledger.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub result: NormalizedResult,
    /// Monetary cost in USD
    pub cost: f64,
    pub credits_charged: i64,
    pub billable_units: u64,
    pub balance_remaining: i64,
}

pub struct Gateway {
    registry: Arc<ProviderRegistry>,
    router: RouterDispatch,
    ledger: CreditLedger,
    pricing: PricingTable,
    store: Arc<dyn CreditStore>,
}

impl Gateway {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn CreditStore>,
        pricing: PricingTable,
        request_timeout: Duration,
    ) -> Self {
        Self {
            router: RouterDispatch::new(registry.clone(), request_timeout),
            ledger: CreditLedger::new(store.clone()),
            registry,
            pricing,
            store,
        }
    }

    /// Assemble a gateway from configuration: stock adapters from the
    /// configured credentials, builtin pricing plus the optional overlay.
    pub fn from_config(config: &GatewayConfig, store: Arc<dyn CreditStore>) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ProviderRegistry::from_credentials(&config.credentials));
        let mut pricing = PricingTable::builtin();
        if let Some(path) = &config.pricing_overlay {
            pricing = pricing.with_overlay_file(path)?;
        }
        Ok(Self::new(registry, store, pricing, config.request_timeout()))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Run one generation to completion and debit the caller.
    ///
    /// Unknown providers, unconfigured adapters, unsupported models, and
    /// insufficient credit are all rejected before any provider traffic
    /// and before any reservation, so they produce no usage record and
    /// leave the balance untouched.
    pub async fn submit_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse> {
        let provider = self
            .router
            .resolve(request)
            .map_err(GatewayError::Provider)?;
        let (reservation, outcome) = self.dispatch_reserved(&provider, request, None).await?;
        self.finish(request, reservation, outcome).await
    }

    /// Run one generation, relaying interim output to `events`.
    ///
    /// The subscriber receives zero or more [`StreamEvent::Chunk`]s in
    /// production order, then exactly one terminal event. The terminal
    /// payload equals what [`Gateway::submit_generation`] would have
    /// returned for the same request; billing is identical on both paths.
    /// A subscriber that hangs up mid-stream does not abort the
    /// generation or its settlement.
    pub async fn stream_generation(
        &self,
        request: &GenerationRequest,
        events: mpsc::Sender<StreamEvent>,
    ) {
        let terminal = self.stream_inner(request, events.clone()).await;
        let event = match terminal {
            Ok(response) => StreamEvent::Completed(Box::new(response)),
            Err(err) => StreamEvent::Failed(err),
        };
        if events.send(event).await.is_err() {
            warn!(user = %request.user_id, "streaming subscriber gone before terminal event");
        }
    }

    async fn stream_inner(
        &self,
        request: &GenerationRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<GenerationResponse> {
        let provider = self
            .router
            .resolve(request)
            .map_err(GatewayError::Provider)?;

        let (sink, forward) = chunk_bridge(events);
        let dispatched = self
            .dispatch_reserved(&provider, request, Some(&sink))
            .await;
        // Dropping the sink closes the chunk channel; waiting for the
        // forwarder guarantees every chunk precedes the terminal event.
        drop(sink);
        let _ = forward.await;

        let (reservation, outcome) = dispatched?;
        self.finish(request, reservation, outcome).await
    }

    /// Reserve estimated credits, then dispatch. The reservation exists
    /// only while a provider call is in flight or being settled.
    async fn dispatch_reserved(
        &self,
        provider: &Arc<dyn GenerationProvider>,
        request: &GenerationRequest,
        chunks: Option<&crate::core::streaming::ChunkSink>,
    ) -> Result<(Reservation, DispatchOutcome)> {
        let estimate = self.pricing.estimate(request);
        let reservation = self
            .ledger
            .reserve(&request.user_id, estimate.credits)
            .await?;
        let outcome = self.router.execute(provider, request, chunks).await;
        Ok((reservation, outcome))
    }

    async fn finish(
        &self,
        request: &GenerationRequest,
        reservation: Reservation,
        outcome: DispatchOutcome,
    ) -> Result<GenerationResponse> {
        match outcome.result {
            Ok(result) => {
                let quote = self
                    .pricing
                    .price(&request.provider, &request.model, &result.usage);
                let balance_remaining = self
                    .ledger
                    .settle(reservation, quote.credits, result.usage.total_units)
                    .await
                    .map_err(GatewayError::Store)?;

                let record = UsageRecord {
                    id: Uuid::new_v4(),
                    user_id: request.user_id.clone(),
                    provider: request.provider.clone(),
                    model: request.model.clone(),
                    billable_units: quote.billable_units,
                    cost: quote.cost,
                    credits_charged: quote.credits,
                    elapsed_seconds: outcome.elapsed_seconds,
                    outcome: UsageOutcome::Completed,
                    created_at: Utc::now(),
                };
                self.store
                    .persist_usage_record(&record)
                    .await
                    .map_err(GatewayError::Store)?;

                info!(
                    user = %request.user_id,
                    provider = %request.provider,
                    model = %request.model,
                    credits = quote.credits,
                    balance = balance_remaining,
                    elapsed = outcome.elapsed_seconds,
                    "generation completed"
                );
                Ok(GenerationResponse {
                    result,
                    cost: quote.cost,
                    credits_charged: quote.credits,
                    billable_units: quote.billable_units,
                    balance_remaining,
                })
            }
            Err(err) => {
                // Full refund: failed attempts never debit the caller.
                self.ledger.release(reservation);
                let record = UsageRecord {
                    id: Uuid::new_v4(),
                    user_id: request.user_id.clone(),
                    provider: request.provider.clone(),
                    model: request.model.clone(),
                    billable_units: 0,
                    cost: 0.0,
                    credits_charged: 0,
                    elapsed_seconds: outcome.elapsed_seconds,
                    outcome: UsageOutcome::Failed {
                        error_kind: err.kind().to_string(),
                    },
                    created_at: Utc::now(),
                };
                if let Err(store_err) = self.store.persist_usage_record(&record).await {
                    warn!(
                        user = %request.user_id,
                        error = %store_err,
                        "failed to record failed generation"
                    );
                }
                Err(GatewayError::Provider(err))
            }
        }
    }

    /// Configuration-presence health for every registered adapter. Makes
    /// no provider traffic and debits nothing.
    pub fn check_provider_health(&self) -> HashMap<String, ProviderStatus> {
        health::probe(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost::ModelRate;
    use crate::core::streaming::ChunkSink;
    use crate::core::types::{GenerationContent, ProviderOutput, UsageUnits};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use crate::core::types::errors::ProviderError;

    struct Scripted {
        configured: bool,
        fail_with: Option<ProviderError>,
    }

    impl Scripted {
        fn ok() -> Self {
            Self {
                configured: true,
                fail_with: None,
            }
        }

        fn failing(err: ProviderError) -> Self {
            Self {
                configured: true,
                fail_with: Some(err),
            }
        }

        fn unconfigured() -> Self {
            Self {
                configured: false,
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn supports_model(&self, model: &str) -> bool {
            model == "mock-model"
        }

        async fn generate(
            &self,
            _model: &str,
            prompt: &str,
            _parameters: &std::collections::HashMap<String, serde_json::Value>,
        ) -> std::result::Result<ProviderOutput, ProviderError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(ProviderOutput {
                content: GenerationContent::Text {
                    text: format!("echo: {prompt}"),
                },
                usage: UsageUnits::tokens(10, 20),
            })
        }

        async fn generate_streaming(
            &self,
            model: &str,
            prompt: &str,
            parameters: &std::collections::HashMap<String, serde_json::Value>,
            chunks: &ChunkSink,
        ) -> std::result::Result<ProviderOutput, ProviderError> {
            chunks.send("echo: ").await;
            chunks.send(prompt.to_string()).await;
            self.generate(model, prompt, parameters).await
        }
    }

    fn gateway_with(provider: Scripted, store: Arc<MemoryStore>) -> Gateway {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(provider));
        // 10/20 tokens at these rates is 0.03 USD, so 3 credits.
        let pricing = PricingTable::builtin().with_model(
            "mock-model",
            ModelRate::PerToken {
                input_per_1k: 1.0,
                output_per_1k: 1.0,
            },
        );
        Gateway::new(
            Arc::new(registry),
            store,
            pricing,
            Duration::from_secs(5),
        )
    }

    fn request() -> GenerationRequest {
        // 100 max output tokens keeps the up-front estimate at 11 credits,
        // well under the test balances; the settled cost is 3 credits.
        GenerationRequest::new("mock", "mock-model", "hello", "alice")
            .with_parameter("max_tokens", 100)
    }

    #[tokio::test]
    async fn success_debits_actual_cost() {
        let store = Arc::new(MemoryStore::new());
        store.set_balance("alice", 100);
        let gateway = gateway_with(Scripted::ok(), store.clone());

        let response = gateway.submit_generation(&request()).await.unwrap();
        assert_eq!(response.credits_charged, 3);
        assert_eq!(response.balance_remaining, 97);
        assert_eq!(response.billable_units, 30);
        assert_eq!(response.result.content.payload(), "echo: hello");
        assert_eq!(store.balance("alice"), 97);

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, UsageOutcome::Completed);
        assert_eq!(records[0].credits_charged, 3);
    }

    #[tokio::test]
    async fn failure_refunds_and_records_zero_cost() {
        let store = Arc::new(MemoryStore::new());
        store.set_balance("alice", 100);
        let gateway = gateway_with(
            Scripted::failing(ProviderError::remote("mock", "backend down")),
            store.clone(),
        );

        let err = gateway.submit_generation(&request()).await.unwrap_err();
        assert!(matches!(
            err.as_provider(),
            Some(ProviderError::RemoteFailure { .. })
        ));
        assert_eq!(store.balance("alice"), 100);
        assert_eq!(gateway.ledger().balance("alice").await.unwrap(), 100);

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].credits_charged, 0);
        assert_eq!(records[0].cost, 0.0);
        assert_eq!(
            records[0].outcome,
            UsageOutcome::Failed {
                error_kind: "remote_failure".to_string()
            }
        );
    }

    #[tokio::test]
    async fn pre_call_rejections_leave_no_trace() {
        let store = Arc::new(MemoryStore::new());
        store.set_balance("alice", 100);

        // Missing credentials reject first, before the model is even looked
        // at.
        let unconfigured = gateway_with(Scripted::unconfigured(), store.clone());
        let err = unconfigured.submit_generation(&request()).await.unwrap_err();
        assert!(matches!(
            err.as_provider(),
            Some(ProviderError::Unconfigured { .. })
        ));

        // A configured adapter still rejects unknown providers and models.
        let gateway = gateway_with(Scripted::ok(), store.clone());

        let mut unknown = request();
        unknown.provider = "nonexistent".to_string();
        let err = gateway.submit_generation(&unknown).await.unwrap_err();
        assert!(matches!(
            err.as_provider(),
            Some(ProviderError::Unsupported { .. })
        ));

        let mut bad_model = request();
        bad_model.model = "other-model".to_string();
        let err = gateway.submit_generation(&bad_model).await.unwrap_err();
        assert!(matches!(
            err.as_provider(),
            Some(ProviderError::Unsupported { .. })
        ));

        assert_eq!(store.balance("alice"), 100);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn insufficient_credit_rejected_before_provider_call() {
        let store = Arc::new(MemoryStore::new());
        store.set_balance("alice", 1);
        let gateway = gateway_with(Scripted::ok(), store.clone());

        // The 11-credit estimate exceeds the single remaining credit.
        let err = gateway.submit_generation(&request()).await.unwrap_err();
        match err.as_provider() {
            Some(ProviderError::InsufficientCredit { available, .. }) => {
                assert_eq!(*available, 1);
            }
            other => panic!("expected InsufficientCredit, got {other:?}"),
        }
        assert_eq!(store.balance("alice"), 1);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn streaming_delivers_chunks_then_one_terminal() {
        let store = Arc::new(MemoryStore::new());
        store.set_balance("alice", 100);
        let gateway = gateway_with(Scripted::ok(), store.clone());

        let (tx, mut rx) = mpsc::channel(16);
        gateway.stream_generation(&request(), tx).await;

        let mut chunks = Vec::new();
        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk(chunk) => {
                    assert!(terminal.is_none(), "chunk after terminal event");
                    chunks.push(chunk);
                }
                other => {
                    assert!(terminal.is_none(), "second terminal event");
                    terminal = Some(other);
                }
            }
        }

        assert_eq!(chunks.concat(), "echo: hello");
        match terminal {
            Some(StreamEvent::Completed(response)) => {
                assert_eq!(response.credits_charged, 3);
                assert_eq!(response.balance_remaining, 97);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(store.balance("alice"), 97);
    }

    #[tokio::test]
    async fn streaming_failure_ends_with_failed_event() {
        let store = Arc::new(MemoryStore::new());
        store.set_balance("alice", 100);
        let gateway = gateway_with(
            Scripted::failing(ProviderError::rate_limited("mock", Some(30))),
            store.clone(),
        );

        let (tx, mut rx) = mpsc::channel(16);
        gateway.stream_generation(&request(), tx).await;

        let mut saw_failed = false;
        while let Some(event) = rx.recv().await {
            if let StreamEvent::Failed(err) = event {
                assert!(!saw_failed, "second terminal event");
                saw_failed = true;
                assert!(matches!(
                    err.as_provider(),
                    Some(ProviderError::RateLimited { .. })
                ));
            }
        }
        assert!(saw_failed);
        assert_eq!(store.balance("alice"), 100);
    }

    #[tokio::test]
    async fn health_reports_configuration_presence() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway_with(Scripted::unconfigured(), store);
        let health = gateway.check_provider_health();
        assert_eq!(health.get("mock"), Some(&ProviderStatus::NotConfigured));
    }
}
