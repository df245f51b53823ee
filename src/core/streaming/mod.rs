//! Streaming relay
//!
//! Delivery contract for a single subscriber: zero or more interim chunks
//! in production order, then exactly one terminal event carrying the same
//! normalized outcome the non-streaming path would have produced. Backends
//! without true incremental output degrade to one chunk followed by the
//! terminal event; a subscriber cannot tell the difference except by
//! latency.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::gateway::GenerationResponse;
use crate::utils::error::GatewayError;

/// Events delivered to a streaming subscriber
#[derive(Debug)]
pub enum StreamEvent {
    /// Interim output as it becomes available
    Chunk(String),
    /// Terminal success, equal to the non-streaming result
    Completed(Box<GenerationResponse>),
    /// Terminal failure
    Failed(GatewayError),
}

/// Sink adapters write interim output into.
///
/// Send failures mean the subscriber went away; they are ignored so the
/// generation runs to completion and its reservation is still settled or
/// released.
#[derive(Debug, Clone)]
pub struct ChunkSink {
    tx: mpsc::Sender<String>,
}

impl ChunkSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, chunk: impl Into<String>) {
        let _ = self.tx.send(chunk.into()).await;
    }
}

/// Bridge a chunk channel onto a subscriber's event channel.
///
/// Returns the sink to hand to the adapter and the forwarding task. The
/// caller must drop the sink and await the task before sending the terminal
/// event, which guarantees the terminal event is last.
pub fn chunk_bridge(events: mpsc::Sender<StreamEvent>) -> (ChunkSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<String>(32);
    let forward = tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            // A closed subscriber still drains the channel so the producer
            // is never backpressured into stalling.
            let _ = events.send(StreamEvent::Chunk(chunk)).await;
        }
    });
    (ChunkSink::new(tx), forward)
}
