//! SQLite-backed queue transport.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use super::{Delivery, QueueTransport, StageMessage, DEFAULT_VISIBILITY_TIMEOUT};
use crate::database::models::StageMessageDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::DbPool;
use crate::domain::Stage;
use crate::{Error, Result};

/// How many lost claim races to tolerate per receive before reporting empty.
const CLAIM_ATTEMPTS: usize = 4;

/// Durable transport backed by the `stage_message` table. A claim is an
/// UPDATE guarded on the row being unclaimed or past its visibility window,
/// verified via `rows_affected`, so concurrent workers never share a claim.
pub struct SqliteQueue {
    pool: DbPool,
    notify: Arc<Notify>,
    visibility: Duration,
}

impl SqliteQueue {
    pub fn new(pool: DbPool) -> Self {
        Self::with_visibility_timeout(pool, DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(pool: DbPool, visibility: Duration) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
            visibility,
        }
    }

    fn visibility_cutoff(&self) -> String {
        let visibility = ChronoDuration::from_std(self.visibility)
            .unwrap_or_else(|_| ChronoDuration::seconds(30 * 60));
        (Utc::now() - visibility).to_rfc3339()
    }
}

#[async_trait]
impl QueueTransport for SqliteQueue {
    async fn send(&self, message: StageMessage) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        retry_on_sqlite_busy("stage_message_send", || {
            let id = id.clone();
            let now = now.clone();
            let message = message.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO stage_message (id, session_id, stage, attempts, enqueued_at)
                    VALUES (?, ?, ?, 0, ?)
                    "#,
                )
                .bind(&id)
                .bind(&message.session_id)
                .bind(message.stage.as_str())
                .bind(&now)
                .execute(&self.pool)
                .await?;
                Ok(())
            }
        })
        .await
        .map_err(|e| Error::transport(format!("enqueue failed: {e}")))?;

        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        for _ in 0..CLAIM_ATTEMPTS {
            let cutoff = self.visibility_cutoff();

            let candidate: Option<(String,)> = sqlx::query_as(
                r#"
                SELECT id FROM stage_message
                WHERE claimed_at IS NULL OR claimed_at <= ?
                ORDER BY enqueued_at
                LIMIT 1
                "#,
            )
            .bind(&cutoff)
            .fetch_optional(&self.pool)
            .await?;

            let Some((id,)) = candidate else {
                return Ok(None);
            };

            let claim_token = uuid::Uuid::new_v4().to_string();
            let claimed = retry_on_sqlite_busy("stage_message_claim", || {
                let id = id.clone();
                let claim_token = claim_token.clone();
                let cutoff = cutoff.clone();
                async move {
                    let done = sqlx::query(
                        r#"
                        UPDATE stage_message
                        SET claimed_at = ?, claim_token = ?, attempts = attempts + 1
                        WHERE id = ? AND (claimed_at IS NULL OR claimed_at <= ?)
                        "#,
                    )
                    .bind(Utc::now().to_rfc3339())
                    .bind(&claim_token)
                    .bind(&id)
                    .bind(&cutoff)
                    .execute(&self.pool)
                    .await?;
                    Ok(done.rows_affected())
                }
            })
            .await?;

            if claimed != 1 {
                // Another worker won this row; try the next candidate.
                debug!("lost claim race for stage message {}", id);
                continue;
            }

            let row =
                sqlx::query_as::<_, StageMessageDbModel>("SELECT * FROM stage_message WHERE id = ?")
                    .bind(&id)
                    .fetch_one(&self.pool)
                    .await?;

            let stage = Stage::parse(&row.stage).ok_or_else(|| {
                Error::transport(format!("unknown stage '{}' in queue row {}", row.stage, id))
            })?;

            return Ok(Some(Delivery {
                message: StageMessage::new(row.session_id, stage),
                attempt: row.attempts.max(1) as u32,
                receipt: claim_token,
            }));
        }

        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        retry_on_sqlite_busy("stage_message_ack", || {
            let receipt = delivery.receipt.clone();
            async move {
                // If the claim expired and someone else holds the row now,
                // the token no longer matches and this deletes nothing.
                sqlx::query("DELETE FROM stage_message WHERE claim_token = ?")
                    .bind(&receipt)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
        })
        .await
    }

    async fn depth(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stage_message")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
