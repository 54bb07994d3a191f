//! Stage handler trait and the built-in handler set.
//!
//! Handlers are pure with respect to the engine: they receive the session
//! snapshot and the previous stage's output, do their work against the
//! session's working directory, and return an output (or an error). They
//! never touch the store or the queue. Handlers must tolerate re-invocation
//! under queue redelivery; the built-ins do this by reusing their own
//! completed artifacts.

pub mod audio;
pub mod combine;
pub mod extract;
pub mod intake;
pub mod merge;
pub mod script;
pub mod transcript;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::{PodcastResult, Session, Stage};
use crate::Result;

pub use audio::AudioHandler;
pub use combine::CombineHandler;
pub use extract::ExtractHandler;
pub use intake::IntakeHandler;
pub use merge::MergeHandler;
pub use script::ScriptHandler;
pub use transcript::TranscriptHandler;

/// Input for a stage handler.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Session snapshot as persisted when the message was claimed.
    pub session: Session,
    /// Output of the previous stage, exactly as it returned it.
    pub input: Option<serde_json::Value>,
    /// Per-session scratch/artifact directory.
    pub workdir: PathBuf,
}

/// Output from a stage handler.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// Data threaded into the next stage.
    pub data: serde_json::Value,
    /// Final audio file, set once by the merge stage.
    pub audio_path: Option<String>,
    /// Final result, set by the last stage before completion.
    pub result: Option<PodcastResult>,
}

impl StageOutput {
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }
}

/// Trait for pipeline stage handlers.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler is registered for.
    fn stage(&self) -> Stage;

    /// Get the handler name.
    fn name(&self) -> &'static str;

    /// Run the stage. Must be safe to re-invoke for the same session.
    async fn run(&self, ctx: &StageContext) -> Result<StageOutput>;
}

/// Explicit stage-to-handler mapping, injected into the engine at
/// construction so tests can substitute fakes per stage.
pub type HandlerRegistry = HashMap<Stage, Arc<dyn StageHandler>>;

/// The full built-in handler set, one per work stage.
pub fn builtin_registry() -> HandlerRegistry {
    let handlers: Vec<Arc<dyn StageHandler>> = vec![
        Arc::new(IntakeHandler),
        Arc::new(ExtractHandler),
        Arc::new(CombineHandler),
        Arc::new(ScriptHandler),
        Arc::new(AudioHandler),
        Arc::new(MergeHandler),
        Arc::new(TranscriptHandler),
    ];
    handlers.into_iter().map(|h| (h.stage(), h)).collect()
}
