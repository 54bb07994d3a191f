//! Combine stage: join extracted texts into a single document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::extract::ExtractedTexts;
use super::{StageContext, StageHandler, StageOutput};
use crate::domain::Stage;
use crate::{Error, Result};

const COMBINED_FILE: &str = "combined.txt";

/// Separator between source documents in the combined text.
const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedText {
    pub combined_text: String,
}

pub struct CombineHandler;

#[async_trait]
impl StageHandler for CombineHandler {
    fn stage(&self) -> Stage {
        Stage::Combine
    }

    fn name(&self) -> &'static str {
        "combine"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let input = ctx
            .input
            .clone()
            .ok_or_else(|| Error::stage("combine invoked without extract output"))?;
        let extracted: ExtractedTexts = serde_json::from_value(input)?;

        let texts: Vec<&str> = extracted
            .texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            return Err(Error::stage("no extracted text to combine"));
        }

        let combined = texts.join(SOURCE_SEPARATOR);
        tokio::fs::create_dir_all(&ctx.workdir).await?;
        tokio::fs::write(ctx.workdir.join(COMBINED_FILE), &combined).await?;

        let output = CombinedText {
            combined_text: combined,
        };
        Ok(StageOutput::data(serde_json::to_value(output)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentSource, GenerationOptions, Session};

    fn context(input: serde_json::Value, workdir: std::path::PathBuf) -> StageContext {
        let session = Session::new(
            vec![ContentSource::file("/data/a.txt")],
            0,
            GenerationOptions::default(),
        )
        .unwrap();
        StageContext {
            session,
            input: Some(input),
            workdir,
        }
    }

    #[tokio::test]
    async fn test_combine_joins_with_separator() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            serde_json::json!({"texts": ["first", "second"]}),
            dir.path().to_path_buf(),
        );

        let output = CombineHandler.run(&ctx).await.unwrap();
        let combined: CombinedText = serde_json::from_value(output.data).unwrap();
        assert_eq!(combined.combined_text, "first\n\n---\n\nsecond");
    }

    #[tokio::test]
    async fn test_combine_skips_blank_texts() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            serde_json::json!({"texts": ["  ", "only real text"]}),
            dir.path().to_path_buf(),
        );

        let output = CombineHandler.run(&ctx).await.unwrap();
        let combined: CombinedText = serde_json::from_value(output.data).unwrap();
        assert_eq!(combined.combined_text, "only real text");
    }

    #[tokio::test]
    async fn test_combine_fails_without_texts() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(serde_json::json!({"texts": []}), dir.path().to_path_buf());
        let err = CombineHandler.run(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::StageHandler(_)));
    }

    #[tokio::test]
    async fn test_combine_requires_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(serde_json::json!({}), dir.path().to_path_buf());
        ctx.input = None;
        let err = CombineHandler.run(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::StageHandler(_)));
    }
}
