pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod effects;
pub mod error;
pub mod fixtures;
pub mod model;
pub mod persistence;
pub mod playlist;
pub mod projector;
pub mod slowmotion;
pub mod time;
pub mod transitions;

pub use backend::{
    BackendError, FieldHandle, MemoryBackend, PlantedTransition, PlaylistEntry, ProducerHandle,
    RenderBackend,
};
pub use config::EditorConfig;
pub use diagnostics::{
    TelemetryGuard, TelemetryOptions, init_tracing, init_tracing_from_config,
    init_tracing_with_options,
};
pub use effects::{EffectSpec, EffectStack, EffectTarget, IndexRemap};
pub use error::{EditError, Unavailable};
pub use model::{ClipInstance, Entry, Project, Source, Track, TrackKind};
pub use playlist::{InsertMode, PlaylistChange};
pub use projector::{InsertClipRequest, ProjectorState, Timeline, TimelineEvent, TrackStatePatch};
pub use slowmotion::{SlowMotionCache, VariantHandle, VariantInfo};
pub use time::{Fps, FramePos, FrameRange, RescaleReport, Rescaler};
pub use transitions::{Transition, TransitionField, TransitionRequest};
