//! Intake stage: validate sources and write the input manifest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{StageContext, StageHandler, StageOutput};
use crate::domain::{ContentSource, SourceKind, Stage};
use crate::{Error, Result};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputManifest {
    pub sources: Vec<ContentSource>,
    pub main_index: usize,
}

/// First stage after submission: checks that file sources actually exist
/// and pins the input manifest into the working directory.
pub struct IntakeHandler;

#[async_trait]
impl StageHandler for IntakeHandler {
    fn stage(&self) -> Stage {
        Stage::Start
    }

    fn name(&self) -> &'static str {
        "intake"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        tokio::fs::create_dir_all(&ctx.workdir).await?;

        let manifest_path = ctx.workdir.join(MANIFEST_FILE);
        if let Ok(existing) = tokio::fs::read_to_string(&manifest_path).await {
            let manifest: InputManifest = serde_json::from_str(&existing)?;
            return Ok(StageOutput::data(serde_json::to_value(manifest)?));
        }

        for source in &ctx.session.inputs {
            if source.kind == SourceKind::File {
                tokio::fs::metadata(&source.reference).await.map_err(|_| {
                    Error::stage(format!("source file not found: {}", source.reference))
                })?;
            }
        }

        let manifest = InputManifest {
            sources: ctx.session.inputs.clone(),
            main_index: ctx.session.main_index,
        };
        tokio::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?).await?;

        Ok(StageOutput::data(serde_json::to_value(manifest)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GenerationOptions, Session};

    fn context(inputs: Vec<ContentSource>, workdir: std::path::PathBuf) -> StageContext {
        let session = Session::new(inputs, 0, GenerationOptions::default()).unwrap();
        StageContext {
            session,
            input: None,
            workdir,
        }
    }

    #[tokio::test]
    async fn test_intake_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("lecture.txt");
        tokio::fs::write(&source_path, "hello").await.unwrap();

        let ctx = context(
            vec![ContentSource::file(source_path.display().to_string())],
            dir.path().join("work"),
        );
        let output = IntakeHandler.run(&ctx).await.unwrap();

        assert!(ctx.workdir.join(MANIFEST_FILE).exists());
        let manifest: InputManifest = serde_json::from_value(output.data).unwrap();
        assert_eq!(manifest.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_intake_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            vec![ContentSource::file("/definitely/not/there.txt")],
            dir.path().join("work"),
        );
        let err = IntakeHandler.run(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::StageHandler(_)));
    }

    #[tokio::test]
    async fn test_intake_reuses_existing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("lecture.txt");
        tokio::fs::write(&source_path, "hello").await.unwrap();

        let ctx = context(
            vec![ContentSource::file(source_path.display().to_string())],
            dir.path().join("work"),
        );
        IntakeHandler.run(&ctx).await.unwrap();

        // Second invocation must not fail even if the source disappears.
        tokio::fs::remove_file(&source_path).await.unwrap();
        let output = IntakeHandler.run(&ctx).await.unwrap();
        let manifest: InputManifest = serde_json::from_value(output.data).unwrap();
        assert_eq!(manifest.main_index, 0);
    }
}
