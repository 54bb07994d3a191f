//! Session entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::{SessionStatus, Stage};
use crate::{Error, Result};

/// Maximum number of content sources per session.
pub const MAX_INPUTS: usize = 4;

/// Kind of a content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Link,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Link => "link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

/// A single content reference submitted with a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSource {
    pub kind: SourceKind,
    pub reference: String,
}

impl ContentSource {
    pub fn file(reference: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::File,
            reference: reference.into(),
        }
    }

    pub fn link(reference: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Link,
            reference: reference.into(),
        }
    }

    /// File stem (or trailing URL segment) used for generated titles.
    pub fn display_name(&self) -> &str {
        let trimmed = self.reference.trim_end_matches('/');
        let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
        base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base)
    }
}

/// Generation options captured at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default = "default_voice")]
    pub voice_id: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub user_prompt: String,
}

fn default_voice() -> String {
    "Fenrir".to_string()
}

fn default_style() -> String {
    "explain".to_string()
}

fn default_duration() -> u32 {
    5
}

fn default_difficulty() -> String {
    "intermediate".to_string()
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            voice_id: default_voice(),
            style: default_style(),
            duration_minutes: default_duration(),
            difficulty: default_difficulty(),
            user_prompt: String::new(),
        }
    }
}

/// A chapter of the generated podcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    pub duration_seconds: f64,
}

/// Final pipeline result, populated only on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodcastResult {
    pub chapters: Vec<Chapter>,
    pub total_duration_seconds: f64,
}

/// Session entity: one submitted unit of pipeline work, tracked end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub inputs: Vec<ContentSource>,
    pub main_index: usize,
    pub options: GenerationOptions,
    pub stage: Stage,
    /// Output of the most recently completed stage, threaded into the next
    /// handler by the engine. The queue carries no business data.
    pub stage_output: Option<serde_json::Value>,
    pub result: Option<PodcastResult>,
    pub error: Option<String>,
    pub audio_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session at `Stage::Start`, validating the submission.
    pub fn new(
        inputs: Vec<ContentSource>,
        main_index: usize,
        options: GenerationOptions,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::validation("at least one content source is required"));
        }
        if inputs.len() > MAX_INPUTS {
            return Err(Error::validation(format!(
                "at most {} content sources are allowed (got {})",
                MAX_INPUTS,
                inputs.len()
            )));
        }
        if main_index >= inputs.len() {
            return Err(Error::validation(format!(
                "main_index {} is out of range for {} sources",
                main_index,
                inputs.len()
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            inputs,
            main_index,
            options,
            stage: Stage::Start,
            stage_output: None,
            result: None,
            error: None,
            audio_path: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// The designated main source.
    pub fn main_source(&self) -> &ContentSource {
        // main_index is validated at construction and immutable afterwards.
        &self.inputs[self.main_index]
    }

    pub fn status(&self) -> SessionStatus {
        self.stage.status()
    }

    pub fn progress(&self) -> i32 {
        self.stage.progress()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// Fields updated together with a stage transition. Applied atomically by
/// the store's compare-and-set; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub stage_output: Option<serde_json::Value>,
    pub result: Option<PodcastResult>,
    pub error: Option<String>,
    pub audio_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new(
            vec![ContentSource::file("/data/lecture.txt")],
            0,
            GenerationOptions::default(),
        )
        .unwrap();
        assert_eq!(session.stage, Stage::Start);
        assert_eq!(session.progress(), 0);
        assert_eq!(session.status(), SessionStatus::Processing);
        assert!(session.result.is_none());
        assert!(session.error.is_none());
    }

    #[test]
    fn test_session_rejects_empty_inputs() {
        let err = Session::new(vec![], 0, GenerationOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_session_rejects_too_many_inputs() {
        let inputs = (0..5)
            .map(|i| ContentSource::file(format!("/data/{i}.txt")))
            .collect();
        let err = Session::new(inputs, 0, GenerationOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_session_rejects_bad_main_index() {
        let inputs = vec![
            ContentSource::file("/data/a.txt"),
            ContentSource::link("https://example.com/paper"),
        ];
        let err = Session::new(inputs, 2, GenerationOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_main_source() {
        let inputs = vec![
            ContentSource::file("/data/a.txt"),
            ContentSource::link("https://example.com/paper"),
        ];
        let session = Session::new(inputs, 1, GenerationOptions::default()).unwrap();
        assert_eq!(session.main_source().kind, SourceKind::Link);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            ContentSource::file("/data/intro-to-rust.txt").display_name(),
            "intro-to-rust"
        );
        assert_eq!(
            ContentSource::link("https://example.com/papers/attention/").display_name(),
            "attention"
        );
    }
}
