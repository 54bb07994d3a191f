//! In-memory queue transport for development and testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::{Delivery, QueueTransport, StageMessage, DEFAULT_VISIBILITY_TIMEOUT};
use crate::{Error, Result};

struct StoredMessage {
    id: u64,
    message: StageMessage,
    attempts: u32,
}

struct Inflight {
    stored: StoredMessage,
    visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<StoredMessage>,
    inflight: HashMap<u64, Inflight>,
    next_id: u64,
}

/// Non-durable transport: a pending deque plus an in-flight map with
/// visibility deadlines. Redelivery of unacked claims gives the same
/// at-least-once semantics as the SQLite backend.
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Arc<Notify>,
    visibility: Duration,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(visibility: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Arc::new(Notify::new()),
            visibility,
        }
    }

    fn requeue_expired(state: &mut QueueState, now: Instant) {
        let expired: Vec<u64> = state
            .inflight
            .iter()
            .filter(|(_, inflight)| inflight.visible_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(inflight) = state.inflight.remove(&id) {
                state.pending.push_back(inflight.stored);
            }
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    async fn send(&self, message: StageMessage) -> Result<()> {
        {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.pending.push_back(StoredMessage {
                id,
                message,
                attempts: 0,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let mut state = self.state.lock();
        Self::requeue_expired(&mut state, Instant::now());

        let Some(mut stored) = state.pending.pop_front() else {
            return Ok(None);
        };
        stored.attempts += 1;

        let delivery = Delivery {
            message: stored.message.clone(),
            attempt: stored.attempts,
            receipt: stored.id.to_string(),
        };
        state.inflight.insert(
            stored.id,
            Inflight {
                stored,
                visible_at: Instant::now() + self.visibility,
            },
        );
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let id: u64 = delivery
            .receipt
            .parse()
            .map_err(|_| Error::transport(format!("invalid receipt '{}'", delivery.receipt)))?;
        // Already redelivered claims are simply gone from the in-flight map;
        // acking them is a no-op under at-least-once semantics.
        self.state.lock().inflight.remove(&id);
        Ok(())
    }

    async fn depth(&self) -> Result<u64> {
        let state = self.state.lock();
        Ok((state.pending.len() + state.inflight.len()) as u64)
    }

    fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
