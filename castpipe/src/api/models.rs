//! API request and response models (DTOs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ContentSource, GenerationOptions, PodcastResult, Session, SessionStatus};

/// Submission request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    /// Content references, at most four.
    pub inputs: Vec<ContentSource>,
    /// Index of the main source within `inputs`.
    pub main_index: usize,
    #[serde(default)]
    pub options: GenerationOptions,
}

/// Submission response.
#[derive(Debug, Clone, Serialize)]
pub struct SessionCreatedResponse {
    pub session_id: String,
    pub stage: String,
    pub progress: i32,
}

impl SessionCreatedResponse {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            stage: session.stage.as_str().to_string(),
            progress: session.progress(),
        }
    }
}

/// Status-poll response.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub progress: i32,
    pub current_step: String,
    pub result: Option<PodcastResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionStatusResponse {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            status: session.status(),
            progress: session.progress(),
            current_step: session.stage.as_str().to_string(),
            result: session.result.clone(),
            error: session.error.clone(),
            created_at: session.created_at,
        }
    }
}

/// One row of the session listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
}

/// Session listing response.
#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

impl SessionListResponse {
    pub fn from_sessions(sessions: &[Session]) -> Self {
        let rows: Vec<SessionSummary> = sessions
            .iter()
            .map(|s| SessionSummary {
                session_id: s.id.clone(),
                status: s.status(),
                progress: s.progress(),
                created_at: s.created_at,
            })
            .collect();
        Self {
            total: rows.len(),
            sessions: rows,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}
