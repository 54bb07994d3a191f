//! Worker pool consuming the stage message queue.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::PipelineEngine;
use crate::queue::QueueTransport;

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Poll interval in milliseconds (fallback when notifications are
    /// missed across process boundaries).
    pub poll_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 250,
        }
    }
}

/// A pool of engine workers, each independently claiming stage messages.
/// No coordination between workers: correctness comes from the store's
/// compare-and-set and the queue's exclusive claims.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Start the worker pool.
    pub fn start(&self, engine: Arc<PipelineEngine>, queue: Arc<dyn QueueTransport>) {
        let poll_interval = std::time::Duration::from_millis(self.config.poll_interval_ms);

        info!("Starting worker pool with {} workers", self.config.workers);

        let mut tasks = self.tasks.lock();
        if let Some(ref mut join_set) = *tasks {
            for i in 0..self.config.workers {
                let cancellation_token = self.cancellation_token.clone();
                let engine = engine.clone();
                let queue = queue.clone();
                let notifier = queue.notifier();

                join_set.spawn(async move {
                    debug!("worker {} started", i);

                    loop {
                        if cancellation_token.is_cancelled() {
                            debug!("worker {} shutting down", i);
                            break;
                        }

                        tokio::select! {
                            _ = cancellation_token.cancelled() => {
                                break;
                            }
                            _ = notifier.notified() => {
                                // New message available
                            }
                            _ = tokio::time::sleep(poll_interval) => {
                                // Poll timeout
                            }
                        }

                        // Drain whatever is claimable right now.
                        loop {
                            if cancellation_token.is_cancelled() {
                                break;
                            }

                            let delivery = match queue.receive().await {
                                Ok(Some(delivery)) => delivery,
                                Ok(None) => break,
                                Err(e) => {
                                    error!("worker {}: receive failed: {}", i, e);
                                    break;
                                }
                            };

                            match engine.handle(&delivery).await {
                                Ok(()) => {
                                    if let Err(e) = queue.ack(&delivery).await {
                                        warn!(
                                            "worker {}: ack failed for session {}: {}",
                                            i, delivery.message.session_id, e
                                        );
                                    }
                                }
                                Err(e) => {
                                    // Infrastructure error: skip the ack so
                                    // the delivery resurfaces after its
                                    // visibility timeout.
                                    error!(
                                        "worker {}: processing failed for session {}: {}",
                                        i, delivery.message.session_id, e
                                    );
                                }
                            }
                        }
                    }
                });
            }
        }
    }

    /// Stop the worker pool and wait for workers to finish.
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}
