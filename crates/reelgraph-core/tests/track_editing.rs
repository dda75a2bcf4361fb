use reelgraph_core::{
    EditError, EffectSpec, FramePos, FrameRange, InsertClipRequest, InsertMode, PlaylistEntry,
    RenderBackend, TrackKind, TrackStatePatch,
    fixtures::{CITY_CLIP_ID, INTRO_CLIP_ID, LUMA_TRANSITION_ID, OVERLAY_CLIP_ID, demo_timeline},
};
use uuid::Uuid;

fn id(text: &str) -> Uuid {
    Uuid::parse_str(text).expect("fixture id should parse")
}

#[test]
fn insert_then_remove_restores_the_track() {
    let timeline = demo_timeline().expect("demo timeline should open");
    let before = timeline.project().tracks[1].clone();

    timeline
        .insert_clip(InsertClipRequest::new(
            1,
            FramePos(200),
            "intro",
            FramePos(0),
            FramePos(50),
        ))
        .expect("insert past the end should pad");
    assert_eq!(timeline.track_duration(1), Ok(FramePos(250)));

    timeline
        .remove_clip(1, FramePos(210))
        .expect("clip should be removed");
    assert_eq!(timeline.project().tracks[1].entries, before.entries);
    timeline.check_invariants().expect("track stays normalized");
}

#[test]
fn strict_insert_refuses_overlap_but_accepts_adjacency() {
    let timeline = demo_timeline().expect("demo timeline should open");

    let err = timeline
        .insert_clip(InsertClipRequest::new(
            0,
            FramePos(50),
            "intro",
            FramePos(0),
            FramePos(50),
        ))
        .unwrap_err();
    assert_eq!(
        err,
        EditError::OccupiedSpan {
            track: 0,
            range: FrameRange::from_frames(50, 100),
        }
    );

    timeline
        .insert_clip(InsertClipRequest::new(
            1,
            FramePos(175),
            "intro",
            FramePos(0),
            FramePos(25),
        ))
        .expect("touching the previous clip end is not an overlap");
    assert_eq!(
        timeline.clip_starts(1),
        Ok(vec![FramePos(75), FramePos(175)])
    );
}

#[test]
fn overwrite_truncates_neighbours_and_clamps_bridging_transition() {
    let timeline = demo_timeline().expect("demo timeline should open");
    timeline
        .insert_clip(
            InsertClipRequest::new(0, FramePos(90), "intro", FramePos(0), FramePos(20))
                .with_mode(InsertMode::Overwrite),
        )
        .expect("overwrite should make room");

    assert_eq!(
        timeline.clip_starts(0),
        Ok(vec![FramePos(0), FramePos(90), FramePos(110)])
    );
    let project = timeline.project();
    let luma = project
        .transitions
        .get(id(LUMA_TRANSITION_ID))
        .expect("luma still bridges the truncated intro");
    assert_eq!(luma.range, FrameRange::from_frames(75, 90));
}

#[test]
fn cut_then_rejoin_reconstructs_the_clip() {
    let timeline = demo_timeline().expect("demo timeline should open");
    let city = id(CITY_CLIP_ID);
    timeline
        .add_clip_effect(city, EffectSpec::new("blur").with_param("radius", "3"))
        .expect("effect should attach");
    let before = timeline.project().tracks[0].clone();

    let tail = timeline.cut_clip(0, FramePos(180)).expect("cut inside clip");
    let (_, head_span, head) = timeline.clip(city).expect("head keeps its id");
    let (_, tail_span, tail_clip) = timeline.clip(tail).expect("tail exists");
    assert_eq!(head_span, FrameRange::from_frames(100, 180));
    assert_eq!(tail_span, FrameRange::from_frames(180, 250));
    assert_eq!((tail_clip.in_point, tail_clip.out_point), (FramePos(80), FramePos(150)));
    assert_eq!(tail_clip.effects, head.effects);

    timeline
        .remove_clip(0, FramePos(200))
        .expect("tail should be removed");
    timeline
        .resize_clip_end(city, FramePos(250))
        .expect("head should grow back");
    assert_eq!(timeline.project().tracks[0], before);
}

#[test]
fn cut_on_a_boundary_is_rejected() {
    let timeline = demo_timeline().expect("demo timeline should open");
    assert!(matches!(
        timeline.cut_clip(0, FramePos(100)),
        Err(EditError::InvalidRange { .. })
    ));
    assert_eq!(
        timeline.cut_clip(1, FramePos(10)),
        Err(EditError::ClipNotFound {
            track: 1,
            position: FramePos(10)
        })
    );
}

#[test]
fn move_to_occupied_destination_leaves_source_untouched() {
    let timeline = demo_timeline().expect("demo timeline should open");
    let overlay = id(OVERLAY_CLIP_ID);
    let before = timeline.project();
    let events = timeline.subscribe();

    let err = timeline
        .move_clip(overlay, 0, FramePos(0), InsertMode::Strict)
        .unwrap_err();
    assert_eq!(
        err,
        EditError::OccupiedSpan {
            track: 0,
            range: FrameRange::from_frames(0, 100),
        }
    );
    assert_eq!(timeline.project().tracks, before.tracks);
    assert!(events.try_recv().is_err());

    timeline
        .move_clip(overlay, 0, FramePos(250), InsertMode::Strict)
        .expect("free span after the last clip");
    assert!(timeline.project().tracks[1].entries.is_empty());
    assert_eq!(
        timeline.clip(overlay).map(|(track, span, _)| (track, span)),
        Some((0, FrameRange::from_frames(250, 350)))
    );
    assert!(timeline.project().transitions.is_empty());
}

#[test]
fn resize_never_overwrites_and_respects_producer_length() {
    let timeline = demo_timeline().expect("demo timeline should open");
    let intro = id(INTRO_CLIP_ID);
    let overlay = id(OVERLAY_CLIP_ID);

    assert!(matches!(
        timeline.resize_clip_end(intro, FramePos(120)),
        Err(EditError::InvalidRange { .. })
    ));

    timeline
        .resize_clip_start(overlay, FramePos(50))
        .expect("blank before the overlay absorbs the growth");
    let (_, span, clip) = timeline.clip(overlay).expect("overlay exists");
    assert_eq!(span, FrameRange::from_frames(50, 175));
    assert_eq!(clip.in_point, FramePos(175));

    assert!(matches!(
        timeline.resize_clip_end(overlay, FramePos(500)),
        Err(EditError::InvalidRange { .. })
    ));
    assert!(matches!(
        timeline.resize_clip_end(overlay, FramePos(50)),
        Err(EditError::InvalidRange { .. })
    ));
}

#[test]
fn slip_keeps_placement_within_producer_bounds() {
    let timeline = demo_timeline().expect("demo timeline should open");
    let city = id(CITY_CLIP_ID);

    assert!(matches!(
        timeline.slip_clip(city, FramePos(-1)),
        Err(EditError::InvalidRange { .. })
    ));
    timeline.slip_clip(city, FramePos(10)).expect("room to slip");
    let (_, span, clip) = timeline.clip(city).expect("city exists");
    assert_eq!(span, FrameRange::from_frames(100, 250));
    assert_eq!((clip.in_point, clip.out_point), (FramePos(10), FramePos(160)));
}

#[test]
fn replace_clip_producer_swaps_source_in_the_engine() {
    let timeline = demo_timeline().expect("demo timeline should open");

    assert!(matches!(
        timeline.replace_clip_producer(1, FramePos(100), "intro"),
        Err(EditError::InvalidRange { .. })
    ));

    let city = timeline
        .replace_clip_producer(0, FramePos(150), "intro")
        .expect("intro is long enough");
    assert_eq!(city, id(CITY_CLIP_ID));
    timeline.with_committed_graph(|backend| {
        let entry = backend.playlist_entry(0, 1).expect("second entry exists");
        let PlaylistEntry::Clip { producer, .. } = entry else {
            panic!("second entry should be a clip");
        };
        assert_eq!(backend.producer_resource(producer), Some("media/intro.mp4"));
    });
}

#[test]
fn space_queries_and_track_state() {
    let timeline = demo_timeline().expect("demo timeline should open");

    assert_eq!(timeline.space_length(1, FramePos(10), true), Ok(Some(FramePos(75))));
    assert_eq!(timeline.space_length(1, FramePos(10), false), Ok(Some(FramePos(65))));
    assert_eq!(timeline.space_length(1, FramePos(100), true), Ok(Some(FramePos(0))));
    assert_eq!(timeline.space_length(1, FramePos(400), true), Ok(None));
    assert_eq!(timeline.track_duration(1), Ok(FramePos(175)));
    assert_eq!(timeline.track_duration(7), Err(EditError::TrackNotFound(7)));

    timeline
        .set_track_state(
            0,
            TrackStatePatch {
                mute: Some(true),
                blind: None,
            },
        )
        .expect("track exists");
    assert_eq!(
        timeline.with_committed_graph(|backend| backend.track_state(0)),
        Some((true, false))
    );
}

#[test]
fn inserting_and_removing_tracks_renumbers_transitions() {
    let timeline = demo_timeline().expect("demo timeline should open");

    timeline
        .insert_track(0, "V0", TrackKind::Video)
        .expect("insert at the top");
    let planted = timeline.with_committed_graph(|backend| backend.transitions());
    assert_eq!(planted.len(), 1);
    assert_eq!((planted[0].1.a_track, planted[0].1.b_track), (1, 2));
    assert_eq!(
        timeline.with_committed_graph(|backend| backend.track_count()),
        4
    );

    let removed = timeline.remove_track(0).expect("track exists");
    assert_eq!(removed.name, "V0");
    let project = timeline.project();
    let luma = project
        .transitions
        .iter()
        .next()
        .expect("luma survives");
    assert_eq!((luma.a_track, luma.b_track), (0, 1));
}
