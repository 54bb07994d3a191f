//! Stage message queue: at-least-once delivery between engine invocations.
//!
//! Messages are triggers, not data channels: a [`StageMessage`] carries only
//! the session id and the stage to run, and the engine re-reads all state
//! from the session store. Transports may redeliver — unacked deliveries
//! become claimable again after a visibility timeout — so consumers must be
//! idempotent.

mod memory;
mod sqlite;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::domain::Stage;
use crate::Result;

/// Default time a claimed message stays invisible before redelivery.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Queue payload: which stage to run for which session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMessage {
    pub session_id: String,
    pub stage: Stage,
}

impl StageMessage {
    pub fn new(session_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            session_id: session_id.into(),
            stage,
        }
    }
}

/// A claimed message. `attempt` counts deliveries of this message including
/// the current one; the receipt is the transport's claim token for `ack`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: StageMessage,
    pub attempt: u32,
    pub receipt: String,
}

/// At-least-once message transport between pipeline stages.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Enqueue a message. Failures are transport errors: the caller may
    /// retry with backoff, and no store state is touched here.
    async fn send(&self, message: StageMessage) -> Result<()>;

    /// Claim the next available message, if any. The claim is exclusive
    /// until acked or until the visibility timeout elapses.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Remove a claimed message permanently. Unacked messages resurface.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Messages currently pending or in flight.
    async fn depth(&self) -> Result<u64>;

    /// Wakeup handle for workers waiting on new messages.
    fn notifier(&self) -> Arc<Notify>;
}
