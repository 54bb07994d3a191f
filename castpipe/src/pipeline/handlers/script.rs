//! Script stage: turn the combined text into a two-speaker dialogue.
//!
//! Stand-in for the LLM script generator: deterministic sentence
//! distribution between host and guest, bounded by the requested episode
//! duration. Swap the handler in the registry for a real generator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::combine::CombinedText;
use super::{StageContext, StageHandler, StageOutput};
use crate::domain::Stage;
use crate::{Error, Result};

const SCRIPT_FILE: &str = "script.json";

/// Spoken-word budget per requested minute of audio.
const WORDS_PER_MINUTE: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueScript {
    pub turns: Vec<DialogueTurn>,
}

pub struct ScriptHandler;

impl ScriptHandler {
    fn split_sentences(text: &str) -> Vec<&str> {
        text.split_inclusive(['.', '!', '?', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "---")
            .collect()
    }

    fn build_turns(combined: &str, word_budget: usize, topic: &str) -> Vec<DialogueTurn> {
        let mut turns = vec![DialogueTurn {
            speaker: "host".to_string(),
            text: format!("Welcome to today's episode about {topic}."),
        }];

        let mut words_used = 0usize;
        for (i, sentence) in Self::split_sentences(combined).iter().enumerate() {
            let words = sentence.split_whitespace().count();
            if words_used + words > word_budget {
                break;
            }
            words_used += words;
            let speaker = if i % 2 == 0 { "guest" } else { "host" };
            turns.push(DialogueTurn {
                speaker: speaker.to_string(),
                text: (*sentence).to_string(),
            });
        }

        turns.push(DialogueTurn {
            speaker: "host".to_string(),
            text: "That's all for today, thanks for listening.".to_string(),
        });
        turns
    }
}

#[async_trait]
impl StageHandler for ScriptHandler {
    fn stage(&self) -> Stage {
        Stage::Script
    }

    fn name(&self) -> &'static str {
        "script"
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput> {
        let input = ctx
            .input
            .clone()
            .ok_or_else(|| Error::stage("script invoked without combine output"))?;
        let combined: CombinedText = serde_json::from_value(input)?;

        let word_budget = ctx.session.options.duration_minutes.max(1) as usize * WORDS_PER_MINUTE;
        let topic = ctx.session.main_source().display_name().to_string();
        let topic = if topic.is_empty() {
            "today's material".to_string()
        } else {
            topic
        };

        let script = DialogueScript {
            turns: Self::build_turns(&combined.combined_text, word_budget, &topic),
        };

        tokio::fs::create_dir_all(&ctx.workdir).await?;
        tokio::fs::write(
            ctx.workdir.join(SCRIPT_FILE),
            serde_json::to_string_pretty(&script)?,
        )
        .await?;

        Ok(StageOutput::data(serde_json::to_value(script)?))
    }
}
