//! The pipeline state machine.
//!
//! One queue message triggers at most one stage transition. All state lives
//! in the session store; the advance is a compare-and-set on the expected
//! stage, which is what makes at-least-once delivery and concurrent workers
//! safe: a duplicate or late message finds the session already past its
//! stage and is dropped.

use rand::random;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::database::repositories::SessionStore;
use crate::domain::{
    ContentSource, GenerationOptions, Session, SessionPatch, Stage,
};
use crate::pipeline::handlers::{HandlerRegistry, StageContext, StageOutput};
use crate::queue::{Delivery, QueueTransport, StageMessage};
use crate::{Error, Result};

/// Enqueue retry bounds for transport transients.
const ENQUEUE_MAX_RETRIES: u32 = 4;
const ENQUEUE_BASE_DELAY_MS: u64 = 50;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root for per-session working directories.
    pub data_dir: PathBuf,
    /// Deadline for a single stage handler invocation.
    pub stage_timeout: Duration,
    /// Deliveries of one message beyond this count fail the job terminally
    /// (the dead-letter bound).
    pub max_delivery_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            stage_timeout: Duration::from_secs(600),
            max_delivery_attempts: 5,
        }
    }
}

/// The pipeline execution engine.
pub struct PipelineEngine {
    store: Arc<dyn SessionStore>,
    queue: Arc<dyn QueueTransport>,
    handlers: HandlerRegistry,
    config: EngineConfig,
}

impl PipelineEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        queue: Arc<dyn QueueTransport>,
        handlers: HandlerRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            handlers,
            config,
        }
    }

    fn workdir(&self, session_id: &str) -> PathBuf {
        self.config.data_dir.join("sessions").join(session_id)
    }

    /// Validate a submission, persist the session at `start`, and enqueue
    /// the first stage message.
    pub async fn submit(
        &self,
        inputs: Vec<ContentSource>,
        main_index: usize,
        options: GenerationOptions,
    ) -> Result<Session> {
        let session = Session::new(inputs, main_index, options)?;
        self.store.create(&session).await?;

        let message = StageMessage::new(&session.id, Stage::Start);
        if let Err(e) = self.enqueue_with_retry(message).await {
            // Don't leave a session stuck at `start` with nothing in flight.
            warn!("failed to enqueue start message for {}: {e}", session.id);
            let _ = self
                .store
                .compare_and_set_stage(
                    &session.id,
                    Stage::Start,
                    Stage::Failed,
                    SessionPatch {
                        error: Some("queue unavailable at submission".to_string()),
                        ..Default::default()
                    },
                )
                .await;
            return Err(e);
        }

        info!("submitted session {} with {} sources", session.id, session.inputs.len());
        Ok(session)
    }

    /// Read-only session snapshot for status polling.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.store.get(session_id).await
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Session>> {
        self.store.list_recent(limit).await
    }

    /// Delete a session. Cancellation is cooperative: in-flight handler
    /// work is not interrupted, but its completion will find the row gone
    /// and discard itself.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.store.delete(session_id).await?;
        let workdir = self.workdir(session_id);
        if let Err(e) = tokio::fs::remove_dir_all(&workdir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("failed to remove workdir for {}: {e}", session_id);
        }
        Ok(())
    }

    /// Queue-consumer entry point: process one delivery.
    ///
    /// Business outcomes (advance, terminal failure, drop) all return
    /// `Ok(())` so the caller acks; only infrastructure errors propagate,
    /// leaving the delivery unacked for redelivery.
    pub async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let message = &delivery.message;

        let session = match self.store.get(&message.session_id).await {
            Ok(session) => session,
            Err(Error::NotFound { .. }) => {
                debug!(
                    "dropping {} message for deleted session {}",
                    message.stage, message.session_id
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        // Idempotent redelivery: a message for a stage the session has
        // already moved past (or a terminal session) is a safe no-op.
        if session.is_terminal() || session.stage.order_index() > message.stage.order_index() {
            debug!(
                "dropping stale {} message for session {} at {}",
                message.stage, session.id, session.stage
            );
            return Ok(());
        }

        // A message ahead of the persisted stage cannot exist under normal
        // operation (stage N+1 is only enqueued after stage N commits).
        if session.stage != message.stage {
            warn!(
                "dropping out-of-order {} message for session {} at {}",
                message.stage, session.id, session.stage
            );
            return Ok(());
        }

        if delivery.attempt > self.config.max_delivery_attempts {
            self.fail(&session, message.stage, format!(
                "stage {} exceeded {} delivery attempts",
                message.stage, self.config.max_delivery_attempts
            ))
            .await;
            return Ok(());
        }

        let Some(handler) = self.handlers.get(&message.stage) else {
            self.fail(
                &session,
                message.stage,
                format!("no handler registered for stage {}", message.stage),
            )
            .await;
            return Ok(());
        };

        let ctx = StageContext {
            input: session.stage_output.clone(),
            workdir: self.workdir(&session.id),
            session: session.clone(),
        };

        debug!("running {} for session {}", handler.name(), session.id);
        let outcome = tokio::time::timeout(self.config.stage_timeout, handler.run(&ctx)).await;

        match outcome {
            Ok(Ok(output)) => self.advance(&session, message.stage, output).await,
            Ok(Err(e)) => {
                self.fail(&session, message.stage, e.to_string()).await;
                Ok(())
            }
            Err(_) => {
                self.fail(
                    &session,
                    message.stage,
                    format!(
                        "stage {} timed out after {:?}",
                        message.stage, self.config.stage_timeout
                    ),
                )
                .await;
                Ok(())
            }
        }
    }

    /// Commit a successful stage and enqueue the next one.
    async fn advance(&self, session: &Session, ran: Stage, output: StageOutput) -> Result<()> {
        let Some(next) = ran.next() else {
            // Only terminal stages lack successors, and those never have
            // handlers; nothing to commit.
            return Ok(());
        };

        let patch = SessionPatch {
            stage_output: Some(output.data),
            result: output.result,
            audio_path: output.audio_path,
            error: None,
        };

        match self
            .store
            .compare_and_set_stage(&session.id, ran, next, patch)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // A concurrent duplicate finished first; its result stands.
                debug!(
                    "discarding {} result for session {}: stage already advanced",
                    ran, session.id
                );
                return Ok(());
            }
            Err(Error::NotFound { .. }) => {
                debug!(
                    "discarding {} result for session {}: session deleted",
                    ran, session.id
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        info!("session {} advanced {} -> {}", session.id, ran, next);

        if next == Stage::Completed {
            return Ok(());
        }

        let message = StageMessage::new(&session.id, next);
        if let Err(e) = self.enqueue_with_retry(message).await {
            warn!(
                "failed to enqueue {} for session {}: {e}; failing the job",
                next, session.id
            );
            self.fail_from(&session.id, next, "queue unavailable between stages".to_string())
                .await;
        }
        Ok(())
    }

    async fn fail(&self, session: &Session, ran: Stage, error: String) {
        warn!("session {} failed at {}: {}", session.id, ran, error);
        self.fail_from(&session.id, ran, error).await;
    }

    /// Terminal failure transition; losing the CAS race or finding the
    /// session deleted are both silent drops.
    async fn fail_from(&self, session_id: &str, expected: Stage, error: String) {
        let patch = SessionPatch {
            error: Some(error),
            ..Default::default()
        };
        match self
            .store
            .compare_and_set_stage(session_id, expected, Stage::Failed, patch)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(
                "not failing session {}: stage moved past {}",
                session_id, expected
            ),
            Err(Error::NotFound { .. }) => {}
            Err(e) => warn!("failed to record failure for session {}: {e}", session_id),
        }
    }

    async fn enqueue_with_retry(&self, message: StageMessage) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.queue.send(message.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < ENQUEUE_MAX_RETRIES => {
                    let backoff_ms = ENQUEUE_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
                    let jitter_ms = random::<u64>() % (backoff_ms / 2 + 1);
                    debug!(
                        "enqueue failed ({e}), retrying in {}ms (attempt {}/{})",
                        backoff_ms + jitter_ms,
                        attempt + 1,
                        ENQUEUE_MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
