//! SQLite session store.

use async_trait::async_trait;
use chrono::Utc;

use super::SessionStore;
use crate::database::models::{db_model_to_session, session_to_db_model, SessionDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::DbPool;
use crate::domain::{Session, SessionPatch, Stage};
use crate::{Error, Result};

/// Durable store backed by the `session` table.
pub struct SqliteSessionStore {
    pool: DbPool,
}

impl SqliteSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        let model = session_to_db_model(session)?;
        retry_on_sqlite_busy("session_create", || {
            let model = model.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO session
                        (id, stage, inputs, main_index, options, stage_output,
                         result, error, audio_path, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&model.id)
                .bind(&model.stage)
                .bind(&model.inputs)
                .bind(model.main_index)
                .bind(&model.options)
                .bind(&model.stage_output)
                .bind(&model.result)
                .bind(&model.error)
                .bind(&model.audio_path)
                .bind(&model.created_at)
                .bind(&model.updated_at)
                .execute(&self.pool)
                .await?;
                Ok(())
            }
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Session> {
        let model = sqlx::query_as::<_, SessionDbModel>("SELECT * FROM session WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Session", id))?;
        db_model_to_session(&model)
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Session>> {
        let models = sqlx::query_as::<_, SessionDbModel>(
            "SELECT * FROM session ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        models.iter().map(db_model_to_session).collect()
    }

    async fn compare_and_set_stage(
        &self,
        id: &str,
        expected: Stage,
        new_stage: Stage,
        patch: SessionPatch,
    ) -> Result<bool> {
        let stage_output = patch
            .stage_output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = patch
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let affected = retry_on_sqlite_busy("session_cas", || {
            let stage_output = stage_output.clone();
            let result = result.clone();
            let error = patch.error.clone();
            let audio_path = patch.audio_path.clone();
            async move {
                // The guarded UPDATE is the whole point: a writer whose
                // expected stage no longer matches changes zero rows.
                let done = sqlx::query(
                    r#"
                    UPDATE session SET
                        stage = ?,
                        stage_output = COALESCE(?, stage_output),
                        result = COALESCE(?, result),
                        error = COALESCE(?, error),
                        audio_path = COALESCE(?, audio_path),
                        updated_at = ?
                    WHERE id = ? AND stage = ?
                    "#,
                )
                .bind(new_stage.as_str())
                .bind(&stage_output)
                .bind(&result)
                .bind(&error)
                .bind(&audio_path)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .bind(expected.as_str())
                .execute(&self.pool)
                .await?;
                Ok(done.rows_affected())
            }
        })
        .await?;

        if affected == 1 {
            return Ok(true);
        }

        // Zero rows: either a concurrent writer advanced the stage, or the
        // session was deleted. Distinguish so the engine can tell a lost
        // race from a cancellation.
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM session WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(Error::not_found("Session", id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let done = sqlx::query("DELETE FROM session WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::not_found("Session", id));
        }
        Ok(())
    }
}
