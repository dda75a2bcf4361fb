use thiserror::Error;
use uuid::Uuid;

use crate::{
    backend::BackendError,
    time::{FramePos, FrameRange},
};

/// Why the rendering engine could not realize a producer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("resource is missing: {0}")]
    Missing(String),
    #[error("resource is corrupt: {0}")]
    Corrupt(String),
    #[error("proxy length {actual} does not match original length {expected}")]
    DurationMismatch { expected: FramePos, actual: FramePos },
}

impl From<BackendError> for Unavailable {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::ResourceMissing(resource) => Self::Missing(resource),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("span {range} on track {track} is occupied")]
    OccupiedSpan { track: usize, range: FrameRange },
    #[error("invalid range: {reason}")]
    InvalidRange { reason: String },
    #[error("producer unavailable for source {source_id}: {reason}")]
    ProducerUnavailable {
        source_id: String,
        reason: Unavailable,
    },
    #[error("transition {0} lost the overlap it bridges")]
    TransitionOrphaned(Uuid),
    #[error("track not found: {0}")]
    TrackNotFound(usize),
    #[error("no clip on track {track} at frame {position}")]
    ClipNotFound { track: usize, position: FramePos },
    #[error("clip not found: {0}")]
    UnknownClip(Uuid),
    #[error("effect index {index} out of range for {len} effects")]
    EffectNotFound { index: usize, len: usize },
    #[error("transition not found: {0}")]
    TransitionNotFound(String),
    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("invalid frame rate {num}/{den}")]
    InvalidFps { num: u32, den: u32 },
    /// An earlier intent panicked mid-edit and never returned the timeline
    /// to idle; the arrangement may be half-applied, so edits are refused.
    #[error("timeline is already mutating")]
    Busy,
    #[error("rendering backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("io error: {0}")]
    Io(String),
}

impl EditError {
    pub(crate) fn invalid_range(reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for EditError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}
