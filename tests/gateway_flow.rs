//! End-to-end gateway flow against a mocked OpenAI backend: real adapter,
//! real router, real ledger, in-memory store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use genroute::{
    Gateway, GenerationRequest, MemoryStore, OpenAiProvider, PricingTable, ProviderError,
    ProviderRegistry, ProviderStatus, StreamEvent, UsageOutcome,
};

/// Route test logs through the captured test writer; `RUST_LOG` controls
/// verbosity.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

fn gateway_against(server: &MockServer, store: Arc<MemoryStore>) -> Gateway {
    init_tracing();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(
        OpenAiProvider::new(Some("test-key".to_string())).with_base_url(server.uri()),
    ));
    Gateway::new(
        Arc::new(registry),
        store,
        PricingTable::builtin(),
        Duration::from_secs(5),
    )
}

async fn mount_chat_completion(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hello there"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30},
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn completed_generation_debits_and_records() {
    let server = MockServer::start().await;
    mount_chat_completion(&server).await;

    let store = Arc::new(MemoryStore::new());
    store.set_balance("alice", 100);
    let gateway = gateway_against(&server, store.clone());

    let request = GenerationRequest::new("openai", "gpt-4o", "hello world", "alice");
    let response = gateway.submit_generation(&request).await.unwrap();

    // 30 tokens of gpt-4o at 0.03/1k each way is 0.0009 USD, floored to the
    // one-credit minimum.
    assert_eq!(response.result.content.payload(), "hello there");
    assert_eq!(response.billable_units, 30);
    assert!((response.cost - 0.0009).abs() < 1e-9);
    assert_eq!(response.credits_charged, 1);
    assert_eq!(response.balance_remaining, 99);
    assert_eq!(store.balance("alice"), 99);

    let records = store.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.user_id, "alice");
    assert_eq!(record.provider, "openai");
    assert_eq!(record.model, "gpt-4o");
    assert_eq!(record.billable_units, 30);
    assert_eq!(record.credits_charged, 1);
    assert_eq!(record.outcome, UsageOutcome::Completed);
    assert!(record.elapsed_seconds >= 0.0);
}

#[tokio::test]
async fn backend_rate_limit_refunds_the_reservation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "15")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set_balance("alice", 100);
    let gateway = gateway_against(&server, store.clone());

    let request = GenerationRequest::new("openai", "gpt-4o", "hello world", "alice");
    let err = gateway.submit_generation(&request).await.unwrap_err();
    assert_eq!(
        err.as_provider(),
        Some(&ProviderError::rate_limited("openai", Some(15)))
    );

    assert_eq!(store.balance("alice"), 100);
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].credits_charged, 0);
    assert_eq!(
        records[0].outcome,
        UsageOutcome::Failed {
            error_kind: "rate_limited".to_string()
        }
    );
}

#[tokio::test]
async fn streaming_terminal_matches_blocking_result() {
    let server = MockServer::start().await;
    // Single-frame SSE stream with a usage frame, then [DONE].
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"hello \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":20}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set_balance("alice", 100);
    let gateway = gateway_against(&server, store.clone());

    let request = GenerationRequest::new("openai", "gpt-4o", "hello world", "alice");
    let (tx, mut rx) = mpsc::channel(16);
    gateway.stream_generation(&request, tx).await;

    let mut chunks = String::new();
    let mut terminal = None;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Chunk(chunk) => {
                assert!(terminal.is_none(), "chunk after terminal event");
                chunks.push_str(&chunk);
            }
            other => {
                assert!(terminal.is_none(), "second terminal event");
                terminal = Some(other);
            }
        }
    }

    assert_eq!(chunks, "hello there");
    match terminal {
        Some(StreamEvent::Completed(response)) => {
            assert_eq!(response.result.content.payload(), "hello there");
            assert_eq!(response.billable_units, 30);
            assert_eq!(response.credits_charged, 1);
            assert_eq!(response.balance_remaining, 99);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    assert_eq!(store.balance("alice"), 99);
}

#[tokio::test]
async fn exhausted_balance_never_reaches_the_backend() {
    let server = MockServer::start().await;
    // No mock mounted: any request to the backend would 404 and show up as
    // a remote failure instead of the expected credit rejection.
    let store = Arc::new(MemoryStore::new());
    store.set_balance("alice", 2);
    let gateway = gateway_against(&server, store.clone());

    let request = GenerationRequest::new("openai", "gpt-4o", "hello world", "alice");
    let err = gateway.submit_generation(&request).await.unwrap_err();
    assert!(matches!(
        err.as_provider(),
        Some(ProviderError::InsufficientCredit { available: 2, .. })
    ));
    assert_eq!(store.balance("alice"), 2);
    assert!(store.records().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_reflects_credential_presence() {
    init_tracing();
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(
        OpenAiProvider::new(Some("test-key".to_string())).with_base_url(server.uri()),
    ));
    registry.register(Arc::new(OpenAiProvider::new(None)));
    // Second registration replaces the first under the same name.
    let gateway = Gateway::new(
        Arc::new(registry),
        store,
        PricingTable::builtin(),
        Duration::from_secs(5),
    );

    let health = gateway.check_provider_health();
    assert_eq!(health.get("openai"), Some(&ProviderStatus::NotConfigured));
    assert!(server.received_requests().await.unwrap().is_empty());
}
