//! Transcript stage: timestamped transcript and the final chapter list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::merge::MergedAudio;
use super::{StageContext, StageHandler, StageOutput};
use crate::domain::{Chapter, PodcastResult, Stage};
use crate::{Error, Result};

const TRANSCRIPT_FILE: &str = "transcript.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub entries: Vec<TranscriptEntry>,
    pub total_duration_seconds: f64,
}

pub struct TranscriptHandler;

#[async_trait]
impl StageHandler for TranscriptHandler {
    fn stage(&self) -> Stage {
        Stage::Transcript
    }

    fn name(&self) -> &'static str {
        "transcript"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let input = ctx
            .input
            .clone()
            .ok_or_else(|| Error::stage("transcript invoked without merge output"))?;
        let merged: MergedAudio = serde_json::from_value(input)?;

        let mut entries = Vec::with_capacity(merged.segments.len());
        let mut cursor = 0.0f64;
        for segment in &merged.segments {
            let end = cursor + segment.duration_seconds;
            entries.push(TranscriptEntry {
                start_seconds: cursor,
                end_seconds: end,
                speaker: segment.speaker.clone(),
                text: segment.text.clone(),
            });
            cursor = end;
        }

        let transcript = Transcript {
            entries,
            total_duration_seconds: merged.total_duration_seconds,
        };
        let transcript_path = ctx.workdir.join(TRANSCRIPT_FILE);
        tokio::fs::create_dir_all(&ctx.workdir).await?;
        tokio::fs::write(
            &transcript_path,
            serde_json::to_string_pretty(&transcript)?,
        )
        .await?;

        let title = {
            let name = ctx.session.main_source().display_name();
            if name.is_empty() {
                "Generated podcast".to_string()
            } else {
                name.to_string()
            }
        };
        let result = PodcastResult {
            chapters: vec![Chapter {
                index: 1,
                title,
                duration_seconds: merged.total_duration_seconds,
            }],
            total_duration_seconds: merged.total_duration_seconds,
        };

        Ok(StageOutput {
            data: serde_json::json!({
                "transcript_path": transcript_path.display().to_string(),
                "total_duration_seconds": merged.total_duration_seconds,
            }),
            audio_path: None,
            result: Some(result),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentSource, GenerationOptions, Session};

    #[tokio::test]
    async fn test_transcript_timestamps_are_cumulative() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(
            vec![ContentSource::file("/data/ownership-basics.txt")],
            0,
            GenerationOptions::default(),
        )
        .unwrap();
        let input = serde_json::json!({
            "audio_path": "/data/out/podcast.mp3",
            "total_duration_seconds": 5.0,
            "segments": [
                {"path": "/p/a", "duration_seconds": 2.0, "speaker": "host", "text": "hello"},
                {"path": "/p/b", "duration_seconds": 3.0, "speaker": "guest", "text": "world"},
            ],
        });
        let ctx = StageContext {
            session,
            input: Some(input),
            workdir: dir.path().to_path_buf(),
        };

        let output = TranscriptHandler.run(&ctx).await.unwrap();

        let result = output.result.unwrap();
        assert_eq!(result.chapters.len(), 1);
        assert_eq!(result.chapters[0].index, 1);
        assert_eq!(result.chapters[0].title, "ownership-basics");
        assert!(result.total_duration_seconds > 0.0);

        let raw = tokio::fs::read_to_string(dir.path().join(TRANSCRIPT_FILE))
            .await
            .unwrap();
        let transcript: Transcript = serde_json::from_str(&raw).unwrap();
        assert_eq!(transcript.entries[0].start_seconds, 0.0);
        assert_eq!(transcript.entries[1].start_seconds, 2.0);
        assert_eq!(transcript.entries[1].end_seconds, 5.0);
    }
}
