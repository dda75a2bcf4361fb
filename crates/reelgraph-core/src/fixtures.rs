use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    backend::MemoryBackend,
    effects::EffectSpec,
    error::EditError,
    model::{ClipInstance, Entry, Project, Source, Track, TrackKind},
    projector::Timeline,
    time::{Fps, FramePos, FrameRange},
    transitions::Transition,
};

pub const INTRO_CLIP_ID: &str = "3f7c2a10-8d4e-4b6a-9c1f-2e5d7a9b0c11";
pub const CITY_CLIP_ID: &str = "b2e91c44-5a7f-4e08-8f3d-61c0a4d2e9f7";
pub const OVERLAY_CLIP_ID: &str = "7d0a5e36-c19b-4f52-a8e4-90b3f6c7d215";
pub const SCORE_CLIP_ID: &str = "e4c8b1f2-6d3a-47e9-b05c-1a2f8d9e3c64";
pub const LUMA_TRANSITION_ID: &str = "5a9e0d7c-2b4f-4c81-9e6a-f3d1c0b8a742";

fn fixture_id(text: &str) -> Uuid {
    Uuid::parse_str(text).expect("fixture id should be valid")
}

fn fixture_clip(id: &str, source_id: &str, in_point: i64, out_point: i64) -> ClipInstance {
    let mut clip = ClipInstance::new(source_id, FramePos(in_point), FramePos(out_point));
    clip.id = fixture_id(id);
    clip
}

/// Three tracks at 25 fps:
///
/// - V1: `intro` over `[0, 100)`, `city` over `[100, 250)`
/// - V2: `city` overlay over `[75, 175)`
/// - A1: `score` over `[0, 250)`
///
/// A luma transition bridges V1 and V2 over `[75, 100)`.
#[must_use]
pub fn demo_project() -> Project {
    let mut project = Project::new("Reelgraph Demo", Fps::PAL);
    project.id = fixture_id("c1d6f0a2-93b7-4e5d-8a21-7f4e9b0c3d58");
    project.session_id = fixture_id("0e8b4d27-f6a1-4c39-b2d5-94a7e1c6f803");
    let fixed_timestamp = DateTime::parse_from_rfc3339("2026-02-23T00:00:00Z")
        .expect("fixture timestamp should be valid")
        .with_timezone(&Utc);
    project.created_at = fixed_timestamp;
    project.updated_at = fixed_timestamp;

    for source in [
        Source::new("intro", "media/intro.mp4", FramePos(250)),
        Source::new("city", "media/city.mp4", FramePos(500)),
        Source::new("score", "media/score.wav", FramePos(1_500)),
    ] {
        project.sources.insert(source.id.clone(), source);
    }

    let mut intro = fixture_clip(INTRO_CLIP_ID, "intro", 0, 100);
    intro
        .effects
        .add(EffectSpec::new("brightness").with_param("level", "1.1"));

    let mut v1 = Track::new("V1", TrackKind::Video);
    v1.id = fixture_id("a4f2c8e1-7b3d-4d96-8e05-c2b1a9f7d634");
    v1.entries = vec![
        Entry::Clip(intro),
        Entry::Clip(fixture_clip(CITY_CLIP_ID, "city", 0, 150)),
    ];

    let mut v2 = Track::new("V2", TrackKind::Video);
    v2.id = fixture_id("d93e1b5f-0c7a-4a28-b6f4-3e8d2c1a7b90");
    v2.entries = vec![
        Entry::Blank {
            length: FramePos(75),
        },
        Entry::Clip(fixture_clip(OVERLAY_CLIP_ID, "city", 200, 300)),
    ];

    let mut a1 = Track::new("A1", TrackKind::Audio);
    a1.id = fixture_id("6b1f9d3e-4a8c-4f07-9d2b-e5c3a0f8b146");
    a1.entries = vec![Entry::Clip(fixture_clip(SCORE_CLIP_ID, "score", 0, 250))];

    project.tracks.extend([v1, v2, a1]);

    let luma = Transition {
        id: fixture_id(LUMA_TRANSITION_ID),
        tag: "luma".to_string(),
        a_track: 0,
        b_track: 1,
        range: FrameRange::from_frames(75, 100),
        params: [("softness".to_string(), "0.2".to_string())].into(),
        inverted: false,
        a_clip: Some(fixture_id(INTRO_CLIP_ID)),
        b_clip: Some(fixture_id(OVERLAY_CLIP_ID)),
        follows_clip: false,
    };
    project.transitions = [luma].into_iter().collect();
    project
}

/// An engine with every demo media resource declared.
#[must_use]
pub fn demo_backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_media("media/intro.mp4", 250)
        .with_media("media/city.mp4", 500)
        .with_media("media/score.wav", 1_500)
}

pub fn demo_timeline() -> Result<Timeline, EditError> {
    Timeline::new(demo_project(), demo_backend())
}
