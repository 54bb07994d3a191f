//! Extract stage: per-source text extraction.
//!
//! Real OCR/parsing backends plug in by replacing this handler in the
//! registry; the built-in reads UTF-8 file content verbatim and produces
//! reference stubs for everything it cannot decode locally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{StageContext, StageHandler, StageOutput};
use crate::domain::{SourceKind, Stage};
use crate::{Error, Result};

const EXTRACTED_FILE: &str = "extracted.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTexts {
    pub texts: Vec<String>,
}

pub struct ExtractHandler;

impl ExtractHandler {
    async fn extract_source(kind: SourceKind, reference: &str) -> Result<String> {
        match kind {
            SourceKind::File => {
                let bytes = tokio::fs::read(reference)
                    .await
                    .map_err(|e| Error::stage(format!("failed to read {reference}: {e}")))?;
                match String::from_utf8(bytes) {
                    Ok(text) => Ok(text),
                    Err(e) => Ok(format!(
                        "[document {reference}: {} bytes of non-text content]",
                        e.as_bytes().len()
                    )),
                }
            }
            SourceKind::Link => Ok(format!("[linked source: {reference}]")),
        }
    }
}

#[async_trait]
impl StageHandler for ExtractHandler {
    fn stage(&self) -> Stage {
        Stage::Extract
    }

    fn name(&self) -> &'static str {
        "extract"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let artifact = ctx.workdir.join(EXTRACTED_FILE);
        if let Ok(existing) = tokio::fs::read_to_string(&artifact).await {
            let extracted: ExtractedTexts = serde_json::from_str(&existing)?;
            return Ok(StageOutput::data(serde_json::to_value(extracted)?));
        }

        let mut texts = Vec::with_capacity(ctx.session.inputs.len());
        for source in &ctx.session.inputs {
            texts.push(Self::extract_source(source.kind, &source.reference).await?);
        }

        if texts.iter().all(|t| t.trim().is_empty()) {
            return Err(Error::stage("no text could be extracted from any source"));
        }

        let extracted = ExtractedTexts { texts };
        tokio::fs::create_dir_all(&ctx.workdir).await?;
        tokio::fs::write(&artifact, serde_json::to_string_pretty(&extracted)?).await?;

        Ok(StageOutput::data(serde_json::to_value(extracted)?))
    }
}
