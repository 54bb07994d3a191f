//! In-memory session store for development and testing.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::SessionStore;
use crate::domain::{Session, SessionPatch, Stage};
use crate::{Error, Result};

/// Non-durable store backed by a concurrent map. Compare-and-set runs under
/// the entry lock, giving the same single-winner semantics as the SQLite
/// backend's guarded UPDATE.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Session> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("Session", id))
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    async fn compare_and_set_stage(
        &self,
        id: &str,
        expected: Stage,
        new_stage: Stage,
        patch: SessionPatch,
    ) -> Result<bool> {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return Err(Error::not_found("Session", id));
        };

        if entry.stage != expected {
            return Ok(false);
        }

        entry.stage = new_stage;
        entry.updated_at = Utc::now();
        if let Some(output) = patch.stage_output {
            entry.stage_output = Some(output);
        }
        if let Some(result) = patch.result {
            entry.result = Some(result);
        }
        if let Some(error) = patch.error {
            entry.error = Some(error);
        }
        if let Some(audio_path) = patch.audio_path {
            entry.audio_path = Some(audio_path);
        }
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("Session", id))
    }
}
