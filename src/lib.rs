//! genroute is an AI generation routing and usage-metering core. It routes
//! text, image, and audio generation requests to the right provider
//! adapter, meters usage, and debits per-user credit balances through a
//! two-phase reserve-and-settle scheme that keeps balances non-negative
//! even under concurrent spending.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use genroute::{Gateway, GatewayConfig, GenerationRequest, MemoryStore};
//!
//! # async fn run() -> genroute::Result<()> {
//! let config = GatewayConfig::from_env()?;
//! let store = Arc::new(MemoryStore::new());
//! store.set_balance("alice", 100);
//!
//! let gateway = Gateway::from_config(&config, store)?;
//! let request = GenerationRequest::new("openai", "gpt-4o", "hello", "alice");
//! let response = gateway.submit_generation(&request).await?;
//! println!(
//!     "{} ({} credits, {} left)",
//!     response.result.content.payload(),
//!     response.credits_charged,
//!     response.balance_remaining,
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod gateway;
pub mod storage;
pub mod utils;

pub use config::{GatewayConfig, ProviderCredentials};
pub use core::cost::{credits_for_cost, ModelRate, PricingTable};
pub use core::health::{HealthMonitor, ProviderStatus};
pub use core::ledger::{AccountSnapshot, CreditLedger, Reservation};
pub use core::providers::{
    AnthropicProvider, ElevenLabsProvider, GeminiProvider, GenerationProvider, OpenAiProvider,
    ProviderRegistry, StabilityProvider,
};
pub use core::router::{DispatchOutcome, RouterDispatch};
pub use core::streaming::{ChunkSink, StreamEvent};
pub use core::types::{
    ContentKind, CostQuote, GenerationContent, GenerationRequest, NormalizedResult,
    ProviderError, ProviderOutput, UsageUnits,
};
pub use gateway::{Gateway, GenerationResponse};
pub use storage::{CreditStore, MemoryStore, StoreError, UsageOutcome, UsageRecord};
pub use utils::error::{GatewayError, Result};
