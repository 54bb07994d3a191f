//! Domain entities and value types.

pub mod session;
pub mod stage;

pub use session::{
    Chapter, ContentSource, GenerationOptions, PodcastResult, Session, SessionPatch, SourceKind,
    MAX_INPUTS,
};
pub use stage::{SessionStatus, Stage};
