use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use reelgraph_core::{
    BackendError, EditError, EffectSpec, FieldHandle, Fps, FramePos, FrameRange,
    InsertClipRequest, InsertMode, MemoryBackend, PlantedTransition, PlaylistEntry,
    ProducerHandle, ProjectorState, RenderBackend, Timeline, Unavailable,
    fixtures::{CITY_CLIP_ID, OVERLAY_CLIP_ID, demo_backend, demo_project, demo_timeline},
};
use uuid::Uuid;

const NO_FAILURE: usize = usize::MAX;

/// Memory engine whose playlist writes to one track can be made to fail, or
/// to crash outright, while the timeline owns it.
struct FlakyBackend {
    inner: MemoryBackend,
    failing_track: Arc<AtomicUsize>,
    crashing: Arc<AtomicBool>,
}

impl FlakyBackend {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let failing_track = Arc::new(AtomicUsize::new(NO_FAILURE));
        (
            Self {
                inner: demo_backend(),
                failing_track: Arc::clone(&failing_track),
                crashing: Arc::new(AtomicBool::new(false)),
            },
            failing_track,
        )
    }

    fn crash_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.crashing)
    }
}

impl RenderBackend for FlakyBackend {
    fn set_fps(&mut self, fps: Fps) {
        self.inner.set_fps(fps);
    }

    fn create_producer(&mut self, resource: &str) -> Result<ProducerHandle, BackendError> {
        self.inner.create_producer(resource)
    }

    fn destroy_producer(&mut self, handle: ProducerHandle) -> Result<(), BackendError> {
        self.inner.destroy_producer(handle)
    }

    fn producer_length(&self, handle: ProducerHandle) -> Result<FramePos, BackendError> {
        self.inner.producer_length(handle)
    }

    fn track_count(&self) -> usize {
        self.inner.track_count()
    }

    fn set_track_count(&mut self, count: usize) {
        self.inner.set_track_count(count);
    }

    fn set_track_state(
        &mut self,
        track: usize,
        mute: bool,
        blind: bool,
    ) -> Result<(), BackendError> {
        self.inner.set_track_state(track, mute, blind)
    }

    fn set_track_filters(
        &mut self,
        track: usize,
        filters: Vec<EffectSpec>,
    ) -> Result<(), BackendError> {
        self.inner.set_track_filters(track, filters)
    }

    fn set_playlist(
        &mut self,
        track: usize,
        entries: Vec<PlaylistEntry>,
    ) -> Result<(), BackendError> {
        assert!(
            !self.crashing.load(Ordering::SeqCst),
            "engine crashed writing track {track}"
        );
        if self.failing_track.load(Ordering::SeqCst) == track {
            return Err(BackendError::UnknownTrack(track));
        }
        self.inner.set_playlist(track, entries)
    }

    fn playlist_count(&self, track: usize) -> Result<usize, BackendError> {
        self.inner.playlist_count(track)
    }

    fn playlist_entry(&self, track: usize, index: usize) -> Result<PlaylistEntry, BackendError> {
        self.inner.playlist_entry(track, index)
    }

    fn playlist_length(&self, track: usize) -> Result<FramePos, BackendError> {
        self.inner.playlist_length(track)
    }

    fn plant_transition(
        &mut self,
        transition: PlantedTransition,
        priority: usize,
    ) -> Result<FieldHandle, BackendError> {
        self.inner.plant_transition(transition, priority)
    }

    fn remove_transition(&mut self, handle: FieldHandle) -> Result<(), BackendError> {
        self.inner.remove_transition(handle)
    }

    fn set_transition_property(
        &mut self,
        handle: FieldHandle,
        key: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        self.inner.set_transition_property(handle, key, value)
    }
}

fn id(text: &str) -> Uuid {
    Uuid::parse_str(text).expect("fixture id should parse")
}

#[test]
fn failed_engine_write_releases_the_variant_it_acquired() {
    let (backend, failing_track) = FlakyBackend::new();
    let timeline = Timeline::new(demo_project(), backend).expect("demo project opens");
    let city = id(CITY_CLIP_ID);
    let before = timeline.project();
    let revision = timeline.revision();
    let producers = timeline.with_committed_graph(|backend| backend.inner.live_producers());
    let events = timeline.subscribe();

    failing_track.store(0, Ordering::SeqCst);
    assert_eq!(
        timeline.change_clip_speed(city, 2.0, 1),
        Err(EditError::Backend(BackendError::UnknownTrack(0)))
    );

    assert_eq!(timeline.state(), ProjectorState::Idle);
    assert_eq!(timeline.revision(), revision);
    assert_eq!(timeline.project().tracks, before.tracks);
    assert!(timeline.variants().is_empty());
    assert!(events.try_recv().is_err());
    assert_eq!(
        timeline.with_committed_graph(|backend| backend.inner.live_producers()),
        producers
    );

    failing_track.store(NO_FAILURE, Ordering::SeqCst);
    assert_eq!(timeline.change_clip_speed(city, 2.0, 1), Ok(FramePos(75)));
    assert_eq!(timeline.variants().len(), 1);
}

#[test]
fn partially_written_engine_is_restored_on_rollback() {
    let (backend, failing_track) = FlakyBackend::new();
    let timeline = Timeline::new(demo_project(), backend).expect("demo project opens");

    failing_track.store(1, Ordering::SeqCst);
    assert!(matches!(
        timeline.move_clip(id(OVERLAY_CLIP_ID), 0, FramePos(300), InsertMode::Strict),
        Err(EditError::Backend(_))
    ));

    timeline.with_committed_graph(|backend| {
        assert_eq!(backend.playlist_count(0), Ok(2));
        assert_eq!(backend.playlist_length(0), Ok(FramePos(250)));
        assert_eq!(backend.playlist_length(1), Ok(FramePos(175)));
        assert_eq!(backend.inner.transitions().len(), 1);
    });
    assert_eq!(
        timeline.clip(id(OVERLAY_CLIP_ID)).map(|(track, span, _)| (track, span)),
        Some((1, FrameRange::from_frames(75, 175)))
    );

    failing_track.store(NO_FAILURE, Ordering::SeqCst);
    timeline
        .move_clip(id(OVERLAY_CLIP_ID), 0, FramePos(300), InsertMode::Strict)
        .expect("engine accepts writes again");
    timeline.with_committed_graph(|backend| {
        assert_eq!(backend.playlist_length(0), Ok(FramePos(400)));
    });
}

#[test]
fn failed_insert_leaves_no_bound_producer_behind() {
    let (backend, failing_track) = FlakyBackend::new();
    let timeline = Timeline::new(demo_project(), backend).expect("demo project opens");
    let producers = timeline.with_committed_graph(|backend| backend.inner.live_producers());

    failing_track.store(1, Ordering::SeqCst);
    assert!(
        timeline
            .insert_clip(
                InsertClipRequest::new(1, FramePos(200), "intro", FramePos(0), FramePos(50))
                    .with_speed(0.5, 1),
            )
            .is_err()
    );
    assert!(timeline.variants().is_empty());
    assert_eq!(
        timeline.with_committed_graph(|backend| backend.inner.live_producers()),
        producers
    );
}

#[test]
fn collapsing_rescale_leaves_the_timeline_untouched() {
    let timeline = demo_timeline().expect("demo timeline should open");
    timeline
        .insert_clip(InsertClipRequest::new(
            1,
            FramePos(0),
            "intro",
            FramePos(0),
            FramePos(1),
        ))
        .expect("a single frame fits before the overlay");
    let before = timeline.project();

    assert!(matches!(
        timeline.rescale_fps(Fps::new(10, 1).expect("valid rate")),
        Err(EditError::InvalidRange { .. })
    ));
    let after = timeline.project();
    assert_eq!(after.fps, Fps::PAL);
    assert_eq!(after.tracks, before.tracks);
    assert_eq!(after.sources, before.sources);
    assert_eq!(timeline.with_committed_graph(MemoryBackend::fps), Fps::PAL);
}

#[test]
fn doubling_the_rate_doubles_every_frame_value() {
    let timeline = demo_timeline().expect("demo timeline should open");

    let report = timeline
        .rescale_fps(Fps::new(50, 1).expect("valid rate"))
        .expect("doubling never collapses");
    assert_eq!(report.inexact, 0);
    assert!(report.values > 0);

    let project = timeline.project();
    assert_eq!(project.fps, Fps::new(50, 1).expect("valid rate"));
    assert_eq!(project.sources["intro"].length, FramePos(500));
    assert_eq!(timeline.clip_starts(0), Ok(vec![FramePos(0), FramePos(200)]));
    let (_, span, clip) = timeline.clip(id(OVERLAY_CLIP_ID)).expect("overlay exists");
    assert_eq!(span, FrameRange::from_frames(150, 350));
    assert_eq!((clip.in_point, clip.out_point), (FramePos(400), FramePos(600)));
    assert_eq!(
        project
            .transitions
            .iter()
            .map(|transition| transition.range)
            .collect::<Vec<_>>(),
        [FrameRange::from_frames(150, 200)]
    );
    assert_eq!(
        timeline.with_committed_graph(MemoryBackend::fps),
        Fps::new(50, 1).expect("valid rate")
    );
}

#[test]
fn fractional_rates_report_inexact_values() {
    let timeline = demo_timeline().expect("demo timeline should open");
    let report = timeline
        .rescale_fps(Fps::NTSC)
        .expect("no entry collapses at 29.97");
    assert!(report.inexact > 0);
    timeline.check_invariants().expect("tracks stay normalized");
}

#[test]
fn proxy_with_a_different_length_is_refused() {
    let mut backend = demo_backend()
        .with_media("media/new.mp4", 300)
        .with_media("proxy/new.mp4", 299)
        .with_media("proxy/good.mp4", 300);
    backend.add_media("media/good.mp4", FramePos(300));
    let timeline = Timeline::new(demo_project(), backend).expect("demo project opens");
    let producers = timeline.with_committed_graph(MemoryBackend::live_producers);

    assert_eq!(
        timeline.register_source("new", "media/new.mp4", Some("proxy/new.mp4")),
        Err(EditError::ProducerUnavailable {
            source_id: "new".to_string(),
            reason: Unavailable::DurationMismatch {
                expected: FramePos(300),
                actual: FramePos(299),
            },
        })
    );
    assert!(!timeline.project().sources.contains_key("new"));
    assert_eq!(
        timeline.with_committed_graph(MemoryBackend::live_producers),
        producers
    );

    let source = timeline
        .register_source("good", "media/good.mp4", Some("proxy/good.mp4"))
        .expect("lengths match");
    assert_eq!(source.proxy.as_deref(), Some("proxy/good.mp4"));
    let clip_id = timeline
        .insert_clip(InsertClipRequest::new(
            1,
            FramePos(200),
            "good",
            FramePos(0),
            FramePos(100),
        ))
        .expect("free span on V2");
    let (_, _, clip) = timeline.clip(clip_id).expect("clip exists");
    let handle = clip.producer.expect("clip is bound");
    let resource = timeline
        .with_committed_graph(|backend| backend.producer_resource(handle).map(str::to_owned));
    assert_eq!(resource.as_deref(), Some("proxy/good.mp4"));
}

#[test]
fn missing_and_corrupt_media_are_distinguished() {
    let mut backend = demo_backend().with_media("media/broken.mp4", 100);
    backend.mark_corrupt("media/broken.mp4");
    let timeline = Timeline::new(demo_project(), backend).expect("demo project opens");

    assert_eq!(
        timeline.register_source("ghost", "media/ghost.mp4", None),
        Err(EditError::ProducerUnavailable {
            source_id: "ghost".to_string(),
            reason: Unavailable::Missing("media/ghost.mp4".to_string()),
        })
    );
    assert!(matches!(
        timeline.register_source("broken", "media/broken.mp4", None),
        Err(EditError::ProducerUnavailable {
            reason: Unavailable::Corrupt(_),
            ..
        })
    ));
}

#[test]
fn sources_in_use_cannot_be_registered_again() {
    let backend = demo_backend().with_media("media/extra.mp4", 80);
    let timeline = Timeline::new(demo_project(), backend).expect("demo project opens");

    assert!(matches!(
        timeline.register_source("city", "media/city.mp4", None),
        Err(EditError::InvalidRange { .. })
    ));

    timeline
        .register_source("extra", "media/extra.mp4", None)
        .expect("new source");
    let producers = timeline.with_committed_graph(MemoryBackend::live_producers);
    timeline
        .register_source("extra", "media/extra.mp4", None)
        .expect("unused sources may be replaced");
    assert_eq!(
        timeline.with_committed_graph(MemoryBackend::live_producers),
        producers
    );
}

#[test]
fn opening_with_missing_media_fails() {
    let backend = MemoryBackend::new()
        .with_media("media/intro.mp4", 250)
        .with_media("media/score.wav", 1_500);

    let error = Timeline::new(demo_project(), backend).err();
    assert_eq!(
        error,
        Some(EditError::ProducerUnavailable {
            source_id: "city".to_string(),
            reason: Unavailable::Missing("media/city.mp4".to_string()),
        })
    );
}

#[test]
fn a_panicking_intent_leaves_the_timeline_refusing_edits() {
    let (backend, _) = FlakyBackend::new();
    let crash = backend.crash_switch();
    let timeline = Timeline::new(demo_project(), backend).expect("demo project opens");

    crash.store(true, Ordering::SeqCst);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        timeline.cut_clip(0, FramePos(50))
    }));
    assert!(outcome.is_err());
    crash.store(false, Ordering::SeqCst);

    assert_eq!(timeline.state(), ProjectorState::Mutating);
    assert_eq!(timeline.cut_clip(0, FramePos(20)), Err(EditError::Busy));
}
