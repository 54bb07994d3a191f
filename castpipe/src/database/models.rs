//! Database row models and domain conversions.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{ContentSource, GenerationOptions, PodcastResult, Session, Stage};
use crate::{Error, Result};

/// Row model for the `session` table. All structured columns are JSON text,
/// timestamps are RFC 3339 text.
#[derive(Debug, Clone, FromRow)]
pub struct SessionDbModel {
    pub id: String,
    pub stage: String,
    pub inputs: String,
    pub main_index: i64,
    pub options: String,
    pub stage_output: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub audio_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_timestamp(raw: &str, column: &str, id: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("invalid {column} for session {id}: {e}")))
}

pub fn session_to_db_model(session: &Session) -> Result<SessionDbModel> {
    Ok(SessionDbModel {
        id: session.id.clone(),
        stage: session.stage.as_str().to_string(),
        inputs: serde_json::to_string(&session.inputs)?,
        main_index: session.main_index as i64,
        options: serde_json::to_string(&session.options)?,
        stage_output: session
            .stage_output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        result: session
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        error: session.error.clone(),
        audio_path: session.audio_path.clone(),
        created_at: session.created_at.to_rfc3339(),
        updated_at: session.updated_at.to_rfc3339(),
    })
}

pub fn db_model_to_session(model: &SessionDbModel) -> Result<Session> {
    let stage = Stage::parse(&model.stage)
        .ok_or_else(|| Error::Other(format!("unknown stage '{}' in database", model.stage)))?;
    let inputs: Vec<ContentSource> = serde_json::from_str(&model.inputs)?;
    let options: GenerationOptions = serde_json::from_str(&model.options)?;
    let stage_output = model
        .stage_output
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    let result: Option<PodcastResult> = model
        .result
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(Session {
        id: model.id.clone(),
        inputs,
        main_index: model.main_index as usize,
        options,
        stage,
        stage_output,
        result,
        error: model.error.clone(),
        audio_path: model.audio_path.clone(),
        created_at: parse_timestamp(&model.created_at, "created_at", &model.id)?,
        updated_at: parse_timestamp(&model.updated_at, "updated_at", &model.id)?,
    })
}

/// Row model for the `stage_message` queue table.
#[derive(Debug, Clone, FromRow)]
pub struct StageMessageDbModel {
    pub id: String,
    pub session_id: String,
    pub stage: String,
    pub attempts: i64,
    pub claim_token: Option<String>,
    pub claimed_at: Option<String>,
    pub enqueued_at: String,
}
