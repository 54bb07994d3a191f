//! Audio stage: synthesize one audio segment per dialogue turn.
//!
//! Stand-in for a TTS backend: segment durations are derived from the
//! spoken word count, and segment bytes are deterministic placeholders at
//! a fixed bitrate. A real TTS provider replaces this handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::script::DialogueScript;
use super::{StageContext, StageHandler, StageOutput};
use crate::domain::Stage;
use crate::{Error, Result};

const METADATA_FILE: &str = "audio_metadata.json";
const SEGMENTS_DIR: &str = "segments";

/// Average speaking rate used to estimate segment durations.
const WORDS_PER_SECOND: f64 = 2.5;

/// Placeholder encoding rate for synthesized segment bytes.
const BYTES_PER_SECOND: u64 = 4_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    pub path: String,
    pub duration_seconds: f64,
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub segments: Vec<AudioSegment>,
}

pub struct AudioHandler;

impl AudioHandler {
    fn turn_duration_seconds(text: &str) -> f64 {
        let words = text.split_whitespace().count();
        (words as f64 / WORDS_PER_SECOND).max(1.0)
    }

    async fn metadata_is_reusable(path: &Path) -> Option<AudioMetadata> {
        let existing = tokio::fs::read_to_string(path).await.ok()?;
        let metadata: AudioMetadata = serde_json::from_str(&existing).ok()?;
        for segment in &metadata.segments {
            tokio::fs::metadata(&segment.path).await.ok()?;
        }
        Some(metadata)
    }
}

#[async_trait]
impl StageHandler for AudioHandler {
    fn stage(&self) -> Stage {
        Stage::Audio
    }

    fn name(&self) -> &'static str {
        "audio"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let metadata_path = ctx.workdir.join(METADATA_FILE);
        if let Some(metadata) = Self::metadata_is_reusable(&metadata_path).await {
            return Ok(StageOutput::data(serde_json::to_value(metadata)?));
        }

        let input = ctx
            .input
            .clone()
            .ok_or_else(|| Error::stage("audio invoked without script output"))?;
        let script: DialogueScript = serde_json::from_value(input)?;
        if script.turns.is_empty() {
            return Err(Error::stage("script has no dialogue turns to synthesize"));
        }

        let segments_dir = ctx.workdir.join(SEGMENTS_DIR);
        tokio::fs::create_dir_all(&segments_dir).await?;

        let mut segments = Vec::with_capacity(script.turns.len());
        for (i, turn) in script.turns.iter().enumerate() {
            let duration = Self::turn_duration_seconds(&turn.text);
            let len = (duration * BYTES_PER_SECOND as f64) as usize;
            let path = segments_dir.join(format!("segment_{i:03}.mp3"));
            tokio::fs::write(&path, vec![(i % 251) as u8; len]).await?;

            segments.push(AudioSegment {
                path: path.display().to_string(),
                duration_seconds: duration,
                speaker: turn.speaker.clone(),
                text: turn.text.clone(),
            });
        }

        let metadata = AudioMetadata { segments };
        tokio::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?).await?;

        Ok(StageOutput::data(serde_json::to_value(metadata)?))
    }
}
