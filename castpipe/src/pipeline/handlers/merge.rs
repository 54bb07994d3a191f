//! Merge stage: concatenate audio segments into the final episode file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::audio::{AudioMetadata, AudioSegment};
use super::{StageContext, StageHandler, StageOutput};
use crate::domain::Stage;
use crate::{Error, Result};

const OUTPUT_FILE: &str = "podcast.mp3";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedAudio {
    pub audio_path: String,
    pub total_duration_seconds: f64,
    /// Threaded through so the transcript stage can place timestamps.
    pub segments: Vec<AudioSegment>,
}

pub struct MergeHandler;

#[async_trait]
impl StageHandler for MergeHandler {
    fn stage(&self) -> Stage {
        Stage::Merge
    }

    fn name(&self) -> &'static str {
        "merge"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let input = ctx
            .input
            .clone()
            .ok_or_else(|| Error::stage("merge invoked without audio output"))?;
        let metadata: AudioMetadata = serde_json::from_value(input)?;
        if metadata.segments.is_empty() {
            return Err(Error::stage("no audio segments to merge"));
        }

        let output_path = ctx.workdir.join(OUTPUT_FILE);
        tokio::fs::create_dir_all(&ctx.workdir).await?;

        // Write to a scratch file first so a re-invocation after a crash
        // never streams a half-merged episode.
        let tmp_path = ctx.workdir.join(format!("{OUTPUT_FILE}.partial"));
        let mut out = tokio::fs::File::create(&tmp_path).await?;
        for segment in &metadata.segments {
            let mut input = tokio::fs::File::open(&segment.path).await.map_err(|e| {
                Error::stage(format!("missing audio segment {}: {e}", segment.path))
            })?;
            tokio::io::copy(&mut input, &mut out).await?;
        }
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&tmp_path, &output_path).await?;

        let total_duration_seconds: f64 = metadata
            .segments
            .iter()
            .map(|s| s.duration_seconds)
            .sum();

        let merged = MergedAudio {
            audio_path: output_path.display().to_string(),
            total_duration_seconds,
            segments: metadata.segments,
        };

        Ok(StageOutput {
            data: serde_json::to_value(&merged)?,
            audio_path: Some(merged.audio_path.clone()),
            result: None,
        })
    }
}
