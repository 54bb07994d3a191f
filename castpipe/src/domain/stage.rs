//! Pipeline stages and the fixed progress mapping.

use serde::{Deserialize, Serialize};

/// One unit of work in the fixed pipeline order.
///
/// A session's persisted `stage` names the work the engine will run next:
/// `Start` means the session was just created and nothing has run, the
/// terminal states are `Completed` and `Failed`. Transitions only move
/// forward in the fixed order or jump to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Start,
    Extract,
    Combine,
    Script,
    Audio,
    Merge,
    Transcript,
    Completed,
    Failed,
}

/// The fixed execution order. `Failed` is a side terminal, not part of it.
const ORDER: [Stage; 8] = [
    Stage::Start,
    Stage::Extract,
    Stage::Combine,
    Stage::Script,
    Stage::Audio,
    Stage::Merge,
    Stage::Transcript,
    Stage::Completed,
];

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Extract => "extract",
            Self::Combine => "combine",
            Self::Script => "script",
            Self::Audio => "audio",
            Self::Merge => "merge",
            Self::Transcript => "transcript",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "extract" => Some(Self::Extract),
            "combine" => Some(Self::Combine),
            "script" => Some(Self::Script),
            "audio" => Some(Self::Audio),
            "merge" => Some(Self::Merge),
            "transcript" => Some(Self::Transcript),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Successor in the fixed order. Terminal stages have none.
    pub fn next(&self) -> Option<Stage> {
        let idx = ORDER.iter().position(|s| s == self)?;
        ORDER.get(idx + 1).copied()
    }

    /// Position in the fixed order. `Failed` sorts after everything so the
    /// staleness check treats it like any other terminal state.
    pub fn order_index(&self) -> usize {
        match self {
            Self::Failed => ORDER.len(),
            other => ORDER
                .iter()
                .position(|s| s == other)
                .unwrap_or(ORDER.len()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The fixed progress mapping of the external status contract.
    pub fn progress(&self) -> i32 {
        match self {
            Self::Start => 0,
            Self::Extract => 30,
            Self::Combine => 40,
            Self::Script => 60,
            Self::Audio => 80,
            Self::Merge => 90,
            Self::Transcript => 100,
            Self::Completed => 100,
            Self::Failed => -1,
        }
    }

    /// Coarse status exposed to status-poll consumers.
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Completed => SessionStatus::Completed,
            Self::Failed => SessionStatus::Failed,
            _ => SessionStatus::Processing,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External status vocabulary: a session is always unambiguously one of
/// these three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_order() {
        let mut stage = Stage::Start;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                Stage::Start,
                Stage::Extract,
                Stage::Combine,
                Stage::Script,
                Stage::Audio,
                Stage::Merge,
                Stage::Transcript,
                Stage::Completed,
            ]
        );
        assert_eq!(Stage::Completed.next(), None);
        assert_eq!(Stage::Failed.next(), None);
    }

    #[test]
    fn test_progress_mapping() {
        assert_eq!(Stage::Start.progress(), 0);
        assert_eq!(Stage::Extract.progress(), 30);
        assert_eq!(Stage::Combine.progress(), 40);
        assert_eq!(Stage::Script.progress(), 60);
        assert_eq!(Stage::Audio.progress(), 80);
        assert_eq!(Stage::Merge.progress(), 90);
        assert_eq!(Stage::Transcript.progress(), 100);
        assert_eq!(Stage::Completed.progress(), 100);
        assert_eq!(Stage::Failed.progress(), -1);
    }

    #[test]
    fn test_parse_roundtrip() {
        for s in [
            Stage::Start,
            Stage::Extract,
            Stage::Combine,
            Stage::Script,
            Stage::Audio,
            Stage::Merge,
            Stage::Transcript,
            Stage::Completed,
            Stage::Failed,
        ] {
            assert_eq!(Stage::parse(s.as_str()), Some(s));
        }
        assert_eq!(Stage::parse("unknown"), None);
    }

    #[test]
    fn test_terminal_ordering() {
        assert!(Stage::Failed.order_index() > Stage::Transcript.order_index());
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Merge.is_terminal());
    }

    #[test]
    fn test_status_from_stage() {
        assert_eq!(Stage::Start.status(), SessionStatus::Processing);
        assert_eq!(Stage::Merge.status(), SessionStatus::Processing);
        assert_eq!(Stage::Completed.status(), SessionStatus::Completed);
        assert_eq!(Stage::Failed.status(), SessionStatus::Failed);
    }
}
