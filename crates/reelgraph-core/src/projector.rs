//! The timeline façade.
//!
//! Every edit intent runs as one transaction: the arrangement is snapshotted,
//! the primitives are applied, transitions are revalidated, lazy producers
//! are bound and the rendering engine is brought in line with the new
//! arrangement. Any failure along the way restores the snapshot, releases
//! what the intent acquired and resynchronizes the engine, so the committed
//! graph never reflects a half-applied edit.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    backend::{
        FieldHandle, MemoryBackend, PlantedTransition, PlaylistEntry, ProducerHandle,
        REVERSE_PROPERTY, RenderBackend,
    },
    effects::{EffectSpec, EffectStack, EffectTarget, IndexRemap},
    error::{EditError, Unavailable},
    model::{
        self, ClipInstance, DEFAULT_SPEED, DEFAULT_STROBE, Entry, Project, Source, Track,
        TrackKind,
    },
    persistence,
    playlist::{self, InsertMode, PlaylistChange},
    slowmotion::{self, SlowMotionCache, VariantInfo},
    time::{Fps, FramePos, FrameRange, RescaleReport, Rescaler},
    transitions::{Transition, TransitionRequest},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectorState {
    Idle,
    Mutating,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    EffectsRemapped {
        target: EffectTarget,
        remap: IndexRemap,
    },
    TransitionRemoved {
        transition: Transition,
        reason: EditError,
    },
    /// Always the last event of a commit.
    FrameUpdated { revision: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertClipRequest {
    pub track: usize,
    pub position: FramePos,
    pub source_id: String,
    pub in_point: FramePos,
    pub out_point: FramePos,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_strobe")]
    pub strobe: u32,
    #[serde(default)]
    pub mode: InsertMode,
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
}

impl InsertClipRequest {
    #[must_use]
    pub fn new(
        track: usize,
        position: FramePos,
        source_id: impl Into<String>,
        in_point: FramePos,
        out_point: FramePos,
    ) -> Self {
        Self {
            track,
            position,
            source_id: source_id.into(),
            in_point,
            out_point,
            speed: DEFAULT_SPEED,
            strobe: DEFAULT_STROBE,
            mode: InsertMode::Strict,
            effects: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: InsertMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_speed(mut self, speed: f64, strobe: u32) -> Self {
        self.speed = speed;
        self.strobe = strobe;
        self
    }

    #[must_use]
    pub fn with_effect(mut self, effect: EffectSpec) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackStatePatch {
    pub mute: Option<bool>,
    pub blind: Option<bool>,
}

#[derive(Debug, Clone)]
struct Planted {
    handle: FieldHandle,
    spec: PlantedTransition,
    priority: usize,
    inverted: bool,
}

/// What the engine was last told about one track. `None` means never written.
#[derive(Debug, Clone, Default)]
struct SyncedTrack {
    playlist: Option<Vec<PlaylistEntry>>,
    state: Option<(bool, bool)>,
    filters: Option<Vec<EffectSpec>>,
}

#[derive(Debug)]
struct Transaction {
    snapshot: Project,
    sources: HashMap<String, ProducerHandle>,
    acquired: Vec<ProducerHandle>,
    released: Vec<ProducerHandle>,
    events: Vec<TimelineEvent>,
}

struct Inner<B> {
    project: Project,
    backend: B,
    variants: SlowMotionCache,
    sources: HashMap<String, ProducerHandle>,
    planted: HashMap<Uuid, Planted>,
    synced: Vec<SyncedTrack>,
    synced_fps: Option<Fps>,
    state: ProjectorState,
    revision: u64,
    subscribers: Vec<Sender<TimelineEvent>>,
}

/// One editing session over a project and the engine rendering it.
pub struct Timeline<B: RenderBackend = MemoryBackend> {
    inner: Mutex<Inner<B>>,
}

impl<B: RenderBackend> Timeline<B> {
    /// Projects `project` onto `backend`. Clip producers are bound here, so a
    /// missing or corrupt source fails the open.
    #[instrument(skip(project, backend), fields(project_id = %project.id, tracks = project.tracks.len()))]
    pub fn new(project: Project, backend: B) -> Result<Self, EditError> {
        project
            .tracks
            .iter()
            .try_for_each(Track::check_invariants)?;
        let timeline = Self {
            inner: Mutex::new(Inner {
                project,
                backend,
                variants: SlowMotionCache::new(),
                sources: HashMap::new(),
                planted: HashMap::new(),
                synced: Vec::new(),
                synced_fps: None,
                state: ProjectorState::Idle,
                revision: 0,
                subscribers: Vec::new(),
            }),
        };
        timeline.run("open", |_, _| Ok(()))?;
        info!("timeline opened");
        Ok(timeline)
    }

    pub fn open(path: &Path, backend: B) -> Result<Self, EditError> {
        let project = persistence::load_project(path)?;
        Self::new(project, backend)
    }

    pub fn save(&self, path: &Path) -> Result<(), EditError> {
        let inner = self.inner.lock();
        persistence::save_project(path, &inner.project)?;
        Ok(())
    }

    pub fn autosave(&self, autosave_dir: &Path) -> Result<PathBuf, EditError> {
        let inner = self.inner.lock();
        Ok(persistence::autosave_project(&inner.project, autosave_dir)?)
    }

    /// Tears down every producer this session created and hands the engine
    /// back.
    #[instrument(skip(self))]
    pub fn close(self) -> B {
        let mut inner = self.inner.into_inner();
        let Inner {
            backend,
            variants,
            sources,
            planted,
            ..
        } = &mut inner;
        for planted in planted.values() {
            if let Err(error) = backend.remove_transition(planted.handle) {
                warn!(?error, "failed to remove planted transition");
            }
        }
        variants.clear(&mut *backend);
        for (source_id, handle) in sources.drain() {
            if let Err(error) = backend.destroy_producer(handle) {
                warn!(%source_id, ?error, "failed to destroy source producer");
            }
        }
        info!("timeline closed");
        inner.backend
    }

    /// A fresh receiver of every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<TimelineEvent> {
        let (sender, receiver) = unbounded();
        self.inner.lock().subscribers.push(sender);
        receiver
    }

    #[must_use]
    pub fn project(&self) -> Project {
        self.inner.lock().project.clone()
    }

    #[must_use]
    pub fn state(&self) -> ProjectorState {
        self.inner.lock().state
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }

    /// Runs `read` against the engine while no edit can be in flight.
    pub fn with_committed_graph<R>(&self, read: impl FnOnce(&B) -> R) -> R {
        let inner = self.inner.lock();
        read(&inner.backend)
    }

    #[must_use]
    pub fn variants(&self) -> Vec<VariantInfo> {
        self.inner.lock().variants.entries()
    }

    #[must_use]
    pub fn variant_references(&self, handle: ProducerHandle) -> usize {
        self.inner.lock().variants.references(handle)
    }

    /// Track index, span and state of a clip.
    #[must_use]
    pub fn clip(&self, clip_id: Uuid) -> Option<(usize, FrameRange, ClipInstance)> {
        let inner = self.inner.lock();
        inner
            .project
            .tracks
            .iter()
            .enumerate()
            .find_map(|(index, track)| {
                track
                    .clips()
                    .find(|(_, clip)| clip.id == clip_id)
                    .map(|(range, clip)| (index, range, clip.clone()))
            })
    }

    pub fn space_length(
        &self,
        track: usize,
        position: FramePos,
        from_blank_start: bool,
    ) -> Result<Option<FramePos>, EditError> {
        let inner = self.inner.lock();
        Ok(inner.track(track)?.space_length(position, from_blank_start))
    }

    pub fn track_duration(&self, track: usize) -> Result<FramePos, EditError> {
        let inner = self.inner.lock();
        Ok(inner.track(track)?.duration())
    }

    pub fn clip_starts(&self, track: usize) -> Result<Vec<FramePos>, EditError> {
        let inner = self.inner.lock();
        Ok(inner.track(track)?.clip_starts())
    }

    pub fn check_invariants(&self) -> Result<(), EditError> {
        let inner = self.inner.lock();
        inner
            .project
            .tracks
            .iter()
            .try_for_each(Track::check_invariants)
    }

    #[instrument(skip(self, request), fields(track = request.track, position = %request.position, source_id = %request.source_id, mode = ?request.mode))]
    pub fn insert_clip(&self, request: InsertClipRequest) -> Result<Uuid, EditError> {
        self.run("insert_clip", |inner, tx| inner.insert_clip(tx, request))
    }

    #[instrument(skip(self), fields(clip_id = %clip_id, new_start = %new_start))]
    pub fn resize_clip_start(&self, clip_id: Uuid, new_start: FramePos) -> Result<(), EditError> {
        self.run("resize_clip_start", |inner, _| {
            let (track, _) = inner.locate_clip(clip_id)?;
            inner.project.tracks[track].resize_clip_start(clip_id, new_start)
        })
    }

    #[instrument(skip(self), fields(clip_id = %clip_id, new_end = %new_end))]
    pub fn resize_clip_end(&self, clip_id: Uuid, new_end: FramePos) -> Result<(), EditError> {
        self.run("resize_clip_end", |inner, _| {
            let (track, clip) = inner.locate_clip(clip_id)?;
            let available = inner.available(&clip)?;
            inner.project.tracks[track].resize_clip_end(clip_id, new_end, available)
        })
    }

    #[instrument(skip(self), fields(clip_id = %clip_id, delta = %delta))]
    pub fn slip_clip(&self, clip_id: Uuid, delta: FramePos) -> Result<(), EditError> {
        self.run("slip_clip", |inner, _| {
            let (track, clip) = inner.locate_clip(clip_id)?;
            let available = inner.available(&clip)?;
            inner.project.tracks[track].slip_clip(clip_id, delta, available)
        })
    }

    #[instrument(skip(self), fields(clip_id = %clip_id, new_position = %new_position))]
    pub fn move_clip(
        &self,
        clip_id: Uuid,
        to_track: usize,
        new_position: FramePos,
        mode: InsertMode,
    ) -> Result<(), EditError> {
        self.run("move_clip", |inner, tx| {
            let (from, _) = inner.locate_clip(clip_id)?;
            let start = inner.project.tracks[from]
                .clip_span(clip_id)
                .map(|span| span.start)
                .ok_or(EditError::UnknownClip(clip_id))?;
            let (_, change) = playlist::move_clip(
                &mut inner.project.tracks,
                from,
                start,
                to_track,
                new_position,
                mode,
            )?;
            inner.settle(tx, change);
            Ok(())
        })
    }

    /// Returns the id of the new tail clip.
    #[instrument(skip(self), fields(position = %position))]
    pub fn cut_clip(&self, track: usize, position: FramePos) -> Result<Uuid, EditError> {
        self.run("cut_clip", |inner, tx| {
            let mut change = inner.track_mut(track)?.cut_clip(track, position)?;
            let tail = change
                .created
                .pop()
                .ok_or(EditError::ClipNotFound { track, position })?;
            inner.settle(tx, change);
            Ok(tail)
        })
    }

    #[instrument(skip(self), fields(position = %position))]
    pub fn remove_clip(&self, track: usize, position: FramePos) -> Result<ClipInstance, EditError> {
        self.run("remove_clip", |inner, tx| {
            let clip = inner.track_mut(track)?.remove_clip(track, position)?;
            tx.released.extend(clip.producer);
            Ok(clip)
        })
    }

    /// Ripples entries and transitions at or after `offset` on `tracks`.
    #[instrument(skip(self), fields(duration = %duration, offset = %offset))]
    pub fn insert_space(
        &self,
        tracks: &[usize],
        duration: FramePos,
        offset: FramePos,
    ) -> Result<(), EditError> {
        self.run("insert_space", |inner, _| {
            for &track in tracks {
                inner.track_mut(track)?.insert_space(offset, duration)?;
            }
            inner
                .project
                .transitions
                .shift_from(tracks, offset, duration);
            Ok(())
        })
    }

    /// Returns the duration the clip ended up with.
    #[instrument(skip(self), fields(clip_id = %clip_id))]
    pub fn change_clip_speed(
        &self,
        clip_id: Uuid,
        speed: f64,
        strobe: u32,
    ) -> Result<FramePos, EditError> {
        self.run("change_clip_speed", |inner, tx| {
            inner.change_clip_speed(tx, clip_id, speed, strobe)
        })
    }

    /// Points the clip at `track`/`position` to another source, keeping its
    /// placement and trim. Used for proxy swaps.
    #[instrument(skip(self), fields(position = %position))]
    pub fn replace_clip_producer(
        &self,
        track: usize,
        position: FramePos,
        source_id: &str,
    ) -> Result<Uuid, EditError> {
        self.run("replace_clip_producer", |inner, tx| {
            inner.replace_clip_producer(tx, track, position, source_id)
        })
    }

    #[instrument(skip(self, effect), fields(effect = %effect.tag))]
    pub fn add_effect(&self, target: EffectTarget, effect: EffectSpec) -> Result<usize, EditError> {
        self.run("add_effect", |inner, tx| {
            let index = inner.effects_mut(target)?.add(effect);
            tx.events.push(TimelineEvent::EffectsRemapped {
                target,
                remap: IndexRemap {
                    added: Some(index),
                    ..IndexRemap::default()
                },
            });
            Ok(index)
        })
    }

    #[instrument(skip(self))]
    pub fn remove_effect(
        &self,
        target: EffectTarget,
        index: usize,
    ) -> Result<EffectSpec, EditError> {
        self.run("remove_effect", |inner, tx| {
            let (effect, remap) = inner.effects_mut(target)?.remove(index)?;
            tx.events
                .push(TimelineEvent::EffectsRemapped { target, remap });
            Ok(effect)
        })
    }

    #[instrument(skip(self))]
    pub fn move_effect(
        &self,
        target: EffectTarget,
        old: usize,
        new: usize,
    ) -> Result<(), EditError> {
        self.run("move_effect", |inner, tx| {
            let remap = inner.effects_mut(target)?.move_to(old, new)?;
            if remap.is_empty() {
                debug!("effect move noop");
            } else {
                tx.events
                    .push(TimelineEvent::EffectsRemapped { target, remap });
            }
            Ok(())
        })
    }

    #[instrument(skip(self, params))]
    pub fn edit_effect(
        &self,
        target: EffectTarget,
        index: usize,
        params: BTreeMap<String, String>,
        replace: bool,
    ) -> Result<(), EditError> {
        self.run("edit_effect", |inner, _| {
            inner.effects_mut(target)?.edit(index, params, replace)
        })
    }

    #[instrument(skip(self))]
    pub fn set_effect_enabled(
        &self,
        target: EffectTarget,
        index: usize,
        enabled: bool,
    ) -> Result<(), EditError> {
        self.run("set_effect_enabled", |inner, _| {
            inner.effects_mut(target)?.set_enabled(index, enabled)
        })
    }

    pub fn add_clip_effect(&self, clip_id: Uuid, effect: EffectSpec) -> Result<usize, EditError> {
        self.add_effect(EffectTarget::Clip { clip_id }, effect)
    }

    pub fn remove_clip_effect(&self, clip_id: Uuid, index: usize) -> Result<EffectSpec, EditError> {
        self.remove_effect(EffectTarget::Clip { clip_id }, index)
    }

    pub fn move_clip_effect(&self, clip_id: Uuid, old: usize, new: usize) -> Result<(), EditError> {
        self.move_effect(EffectTarget::Clip { clip_id }, old, new)
    }

    pub fn edit_clip_effect(
        &self,
        clip_id: Uuid,
        index: usize,
        params: BTreeMap<String, String>,
        replace: bool,
    ) -> Result<(), EditError> {
        self.edit_effect(EffectTarget::Clip { clip_id }, index, params, replace)
    }

    pub fn add_track_effect(&self, track: usize, effect: EffectSpec) -> Result<usize, EditError> {
        self.add_effect(EffectTarget::Track { track }, effect)
    }

    pub fn remove_track_effect(&self, track: usize, index: usize) -> Result<EffectSpec, EditError> {
        self.remove_effect(EffectTarget::Track { track }, index)
    }

    pub fn move_track_effect(&self, track: usize, old: usize, new: usize) -> Result<(), EditError> {
        self.move_effect(EffectTarget::Track { track }, old, new)
    }

    pub fn edit_track_effect(
        &self,
        track: usize,
        index: usize,
        params: BTreeMap<String, String>,
        replace: bool,
    ) -> Result<(), EditError> {
        self.edit_effect(EffectTarget::Track { track }, index, params, replace)
    }

    #[instrument(skip(self, request), fields(tag = %request.tag, a_track = request.a_track, b_track = request.b_track, range = %request.range))]
    pub fn attach_transition(&self, request: TransitionRequest) -> Result<Uuid, EditError> {
        self.run("attach_transition", |inner, _| {
            let Project {
                tracks,
                transitions,
                ..
            } = &mut inner.project;
            transitions.attach(tracks, request)
        })
    }

    /// Composites a clip onto `target_track` for as long as the clip exists;
    /// the composite follows the clip through moves and resizes.
    #[instrument(skip(self, params), fields(clip_id = %clip_id, target_track))]
    pub fn attach_clip_composite(
        &self,
        clip_id: Uuid,
        target_track: usize,
        params: BTreeMap<String, String>,
    ) -> Result<Uuid, EditError> {
        self.run("attach_clip_composite", |inner, _| {
            let Project {
                tracks,
                transitions,
                ..
            } = &mut inner.project;
            transitions.attach_to_clip(tracks, clip_id, target_track, params)
        })
    }

    #[instrument(skip(self), fields(clip_id = %clip_id))]
    pub fn detach_clip_composite(&self, clip_id: Uuid) -> Result<Transition, EditError> {
        self.run("detach_clip_composite", |inner, _| {
            let transitions = &mut inner.project.transitions;
            let id = transitions
                .clip_bound(clip_id)
                .map(|transition| transition.id)
                .ok_or_else(|| EditError::TransitionNotFound(format!("composite on {clip_id}")))?;
            transitions.remove(id)
        })
    }

    #[instrument(skip(self), fields(range = %range))]
    pub fn detach_transition(
        &self,
        tag: &str,
        a_track: usize,
        b_track: usize,
        range: FrameRange,
    ) -> Result<Transition, EditError> {
        self.run("detach_transition", |inner, _| {
            inner
                .project
                .transitions
                .detach(tag, a_track, b_track, range)
        })
    }

    #[instrument(skip(self), fields(transition_id = %id, range = %range))]
    pub fn move_transition(
        &self,
        id: Uuid,
        a_track: usize,
        b_track: usize,
        range: FrameRange,
    ) -> Result<(), EditError> {
        self.run("move_transition", |inner, _| {
            let Project {
                tracks,
                transitions,
                ..
            } = &mut inner.project;
            transitions.move_to(tracks, id, a_track, b_track, range)
        })
    }

    #[instrument(skip(self, params), fields(transition_id = %id))]
    pub fn update_transition_params(
        &self,
        id: Uuid,
        params: BTreeMap<String, String>,
    ) -> Result<(), EditError> {
        self.run("update_transition_params", |inner, _| {
            inner.project.transitions.update_params(id, params)
        })
    }

    #[instrument(skip(self, params), fields(transition_id = %id))]
    pub fn update_transition_type(
        &self,
        id: Uuid,
        tag: &str,
        params: BTreeMap<String, String>,
    ) -> Result<(), EditError> {
        self.run("update_transition_type", |inner, _| {
            inner.project.transitions.update_type(id, tag, params)
        })
    }

    /// Returns the new inversion state.
    #[instrument(skip(self), fields(transition_id = %id))]
    pub fn invert_transition(&self, id: Uuid) -> Result<bool, EditError> {
        self.run("invert_transition", |inner, _| {
            inner.project.transitions.invert(id)
        })
    }

    #[instrument(skip(self), fields(transition_id = %id))]
    pub fn reorder_transition(&self, id: Uuid, z_order: usize) -> Result<(), EditError> {
        self.run("reorder_transition", |inner, _| {
            inner.project.transitions.reorder(id, z_order)
        })
    }

    #[instrument(skip(self))]
    pub fn insert_track(
        &self,
        index: usize,
        name: &str,
        kind: TrackKind,
    ) -> Result<Uuid, EditError> {
        self.run("insert_track", |inner, _| {
            if index > inner.project.tracks.len() {
                return Err(EditError::TrackNotFound(index));
            }
            let track = Track::new(name, kind);
            let id = track.id;
            inner.project.tracks.insert(index, track);
            inner.project.transitions.on_track_inserted(index);
            Ok(id)
        })
    }

    #[instrument(skip(self))]
    pub fn remove_track(&self, index: usize) -> Result<Track, EditError> {
        self.run("remove_track", |inner, tx| {
            if index >= inner.project.tracks.len() {
                return Err(EditError::TrackNotFound(index));
            }
            let track = inner.project.tracks.remove(index);
            tx.released.extend(
                track
                    .entries
                    .iter()
                    .filter_map(Entry::as_clip)
                    .filter_map(|clip| clip.producer),
            );
            for transition in inner.project.transitions.on_track_removed(index) {
                tx.events.push(TimelineEvent::TransitionRemoved {
                    reason: EditError::TransitionOrphaned(transition.id),
                    transition,
                });
            }
            Ok(track)
        })
    }

    #[instrument(skip(self))]
    pub fn set_track_state(
        &self,
        track: usize,
        patch: TrackStatePatch,
    ) -> Result<Track, EditError> {
        self.run("set_track_state", |inner, _| {
            let state = inner.track_mut(track)?;
            if let Some(mute) = patch.mute {
                state.mute = mute;
            }
            if let Some(blind) = patch.blind {
                state.blind = blind;
            }
            Ok(state.clone())
        })
    }

    /// Opens `resource` (or `proxy`, when given) in the engine and registers
    /// it under `id`. A proxy must report the same length as the original.
    #[instrument(skip(self), fields(source_id = %id))]
    pub fn register_source(
        &self,
        id: &str,
        resource: &str,
        proxy: Option<&str>,
    ) -> Result<Source, EditError> {
        self.run("register_source", |inner, _| {
            inner.register_source(id, resource, proxy)
        })
    }

    /// Re-quantizes every stored frame value to `fps`.
    #[instrument(skip(self), fields(fps = %fps))]
    pub fn rescale_fps(&self, fps: Fps) -> Result<RescaleReport, EditError> {
        self.run("rescale_fps", |inner, _| inner.rescale_fps(fps))
    }

    /// Rewrites every playlist and track setting in the engine.
    #[instrument(skip(self))]
    pub fn refresh(&self) -> Result<(), EditError> {
        self.run("refresh", |inner, _| {
            for synced in &mut inner.synced {
                *synced = SyncedTrack::default();
            }
            inner.synced_fps = None;
            Ok(())
        })
    }

    fn run<T>(
        &self,
        intent: &'static str,
        apply: impl FnOnce(&mut Inner<B>, &mut Transaction) -> Result<T, EditError>,
    ) -> Result<T, EditError> {
        let mut inner = self.inner.lock();
        if inner.state != ProjectorState::Idle {
            return Err(EditError::Busy);
        }
        inner.state = ProjectorState::Mutating;
        let mut tx = Transaction {
            snapshot: inner.project.clone(),
            sources: inner.sources.clone(),
            acquired: Vec::new(),
            released: Vec::new(),
            events: Vec::new(),
        };

        let outcome = match apply(&mut *inner, &mut tx) {
            Ok(value) => inner.commit(&mut tx).map(|()| value),
            Err(error) => Err(error),
        };
        match outcome {
            Ok(value) => {
                inner.finish(tx);
                info!(intent, revision = inner.revision, "edit committed");
                Ok(value)
            }
            Err(error) => {
                warn!(intent, %error, "edit rolled back");
                inner.rollback(tx);
                Err(error)
            }
        }
    }
}

impl<B: RenderBackend> Inner<B> {
    fn track(&self, index: usize) -> Result<&Track, EditError> {
        self.project
            .tracks
            .get(index)
            .ok_or(EditError::TrackNotFound(index))
    }

    fn track_mut(&mut self, index: usize) -> Result<&mut Track, EditError> {
        self.project
            .tracks
            .get_mut(index)
            .ok_or(EditError::TrackNotFound(index))
    }

    fn locate_clip(&self, clip_id: Uuid) -> Result<(usize, ClipInstance), EditError> {
        self.project
            .tracks
            .iter()
            .enumerate()
            .find_map(|(index, track)| {
                track
                    .clips()
                    .find(|(_, clip)| clip.id == clip_id)
                    .map(|(_, clip)| (index, clip.clone()))
            })
            .ok_or(EditError::UnknownClip(clip_id))
    }

    fn clip_mut(&mut self, clip_id: Uuid) -> Result<&mut ClipInstance, EditError> {
        self.project
            .tracks
            .iter_mut()
            .flat_map(|track| track.entries.iter_mut())
            .find_map(|entry| entry.as_clip_mut().filter(|clip| clip.id == clip_id))
            .ok_or(EditError::UnknownClip(clip_id))
    }

    fn source(&self, source_id: &str) -> Result<&Source, EditError> {
        self.project
            .sources
            .get(source_id)
            .ok_or_else(|| EditError::SourceNotFound(source_id.to_string()))
    }

    /// Frames the producer played by `clip` can deliver.
    fn available(&self, clip: &ClipInstance) -> Result<FramePos, EditError> {
        let source = self.source(&clip.source_id)?;
        Ok(slowmotion::variant_length(source.length, clip.speed))
    }

    fn effects_mut(&mut self, target: EffectTarget) -> Result<&mut EffectStack, EditError> {
        match target {
            EffectTarget::Track { track } => Ok(&mut self.track_mut(track)?.effects),
            EffectTarget::Clip { clip_id } => Ok(&mut self.clip_mut(clip_id)?.effects),
        }
    }

    /// Books the producer references a playlist edit duplicated or dropped
    /// and hands transitions past each cut to the tail clip.
    fn settle(&mut self, tx: &mut Transaction, change: PlaylistChange) {
        for split in &change.splits {
            self.project.transitions.follow_split(split);
        }
        for handle in change.duplicated {
            self.variants.retain(handle);
            tx.acquired.push(handle);
        }
        tx.released.extend(
            change
                .removed
                .iter()
                .filter_map(|clip| clip.producer),
        );
    }

    fn insert_clip(
        &mut self,
        tx: &mut Transaction,
        request: InsertClipRequest,
    ) -> Result<Uuid, EditError> {
        slowmotion::validate_speed(request.speed, request.strobe)?;
        let source = self.source(&request.source_id)?;
        let available = slowmotion::variant_length(source.length, request.speed);
        if request.in_point < FramePos::ZERO || request.out_point > available {
            return Err(EditError::invalid_range(format!(
                "[{}, {}) exceeds producer length {available}",
                request.in_point, request.out_point
            )));
        }

        let mut clip = ClipInstance::new(request.source_id, request.in_point, request.out_point);
        clip.speed = request.speed;
        clip.strobe = request.strobe;
        clip.effects = request.effects.into_iter().collect();
        let clip_id = clip.id;

        let change = self.track_mut(request.track)?.insert_clip(
            request.track,
            request.position,
            clip,
            request.mode,
        )?;
        self.settle(tx, change);
        Ok(clip_id)
    }

    fn change_clip_speed(
        &mut self,
        tx: &mut Transaction,
        clip_id: Uuid,
        speed: f64,
        strobe: u32,
    ) -> Result<FramePos, EditError> {
        slowmotion::validate_speed(speed, strobe)?;
        let (track, clip) = self.locate_clip(clip_id)?;
        if model::is_same_speed(clip.speed, speed) && clip.strobe == strobe {
            debug!("speed change noop");
            return Ok(clip.duration());
        }

        let source = self.source(&clip.source_id)?.clone();
        let ratio = clip.speed.abs() / speed.abs();
        let scale = |frames: FramePos| FramePos((frames.0 as f64 * ratio).round() as i64);
        let in_point = scale(clip.in_point);
        let available = slowmotion::variant_length(source.length, speed);
        if in_point >= available {
            return Err(EditError::invalid_range(format!(
                "in point {in_point} is past the end of the {speed}x producer"
            )));
        }
        let requested = scale(clip.duration()).min(available - in_point);

        let applied = self.project.tracks[track].retime_clip(clip_id, in_point, requested)?;

        let source_producer = open_source(&mut self.backend, &mut self.sources, &source)?;
        let handle =
            self.variants
                .acquire(&mut self.backend, &source, source_producer, speed, strobe)?;
        tx.acquired.push(handle);
        tx.released.extend(clip.producer);

        let retimed = self.clip_mut(clip_id)?;
        retimed.speed = speed;
        retimed.strobe = strobe;
        retimed.producer = Some(handle);
        info!(%applied, %handle, "clip speed changed");
        Ok(applied)
    }

    fn replace_clip_producer(
        &mut self,
        tx: &mut Transaction,
        track: usize,
        position: FramePos,
        source_id: &str,
    ) -> Result<Uuid, EditError> {
        let source = self.source(source_id)?;
        let source_length = source.length;
        let (index, _) = self.track(track)?.clip_index_at(track, position)?;
        let Some(clip) = self.project.tracks[track].entries[index].as_clip_mut() else {
            return Err(EditError::ClipNotFound { track, position });
        };
        let available = slowmotion::variant_length(source_length, clip.speed);
        if clip.out_point > available {
            return Err(EditError::invalid_range(format!(
                "out point {} exceeds length {available} of source {source_id}",
                clip.out_point
            )));
        }
        tx.released.extend(clip.producer.take());
        clip.source_id = source_id.to_string();
        Ok(clip.id)
    }

    fn register_source(
        &mut self,
        id: &str,
        resource: &str,
        proxy: Option<&str>,
    ) -> Result<Source, EditError> {
        let in_use = self
            .project
            .tracks
            .iter()
            .flat_map(Track::clips)
            .any(|(_, clip)| clip.source_id == id);
        if in_use && self.project.sources.contains_key(id) {
            return Err(EditError::invalid_range(format!(
                "source {id} is referenced by clips and cannot be re-registered"
            )));
        }

        let unavailable = |error| EditError::ProducerUnavailable {
            source_id: id.to_string(),
            reason: Unavailable::from(error),
        };
        let original = self.backend.create_producer(resource).map_err(unavailable)?;
        let length = self.backend.producer_length(original).map_err(unavailable);
        let length = match length {
            Ok(length) => length,
            Err(error) => {
                self.destroy(original);
                return Err(error);
            }
        };

        let mut source = Source::new(id, resource, length);
        let handle = match proxy {
            None => original,
            Some(proxy) => {
                self.destroy(original);
                let handle = self.backend.create_producer(proxy).map_err(unavailable)?;
                let actual = self.backend.producer_length(handle).map_err(unavailable);
                match actual {
                    Ok(actual) if actual == length => {}
                    Ok(actual) => {
                        self.destroy(handle);
                        return Err(EditError::ProducerUnavailable {
                            source_id: id.to_string(),
                            reason: Unavailable::DurationMismatch {
                                expected: length,
                                actual,
                            },
                        });
                    }
                    Err(error) => {
                        self.destroy(handle);
                        return Err(error);
                    }
                }
                source.proxy = Some(proxy.to_string());
                handle
            }
        };

        info!(%handle, %length, "source registered");
        self.sources.insert(id.to_string(), handle);
        self.project.sources.insert(id.to_string(), source.clone());
        Ok(source)
    }

    fn rescale_fps(&mut self, fps: Fps) -> Result<RescaleReport, EditError> {
        let fps = fps.validate()?;
        let mut rescaler = Rescaler::new(self.project.fps, fps)?;

        for source in self.project.sources.values_mut() {
            source.length = rescaler.duration(source.length)?;
        }
        for (index, track) in self.project.tracks.iter_mut().enumerate() {
            let mut old_cursor = FramePos::ZERO;
            let mut new_cursor = FramePos::ZERO;
            for entry in &mut track.entries {
                let old_end = old_cursor + entry.duration();
                let new_end = rescaler.position(old_end)?;
                let length = new_end - new_cursor;
                if !length.is_positive() {
                    return Err(EditError::invalid_range(format!(
                        "entry at {old_cursor} on track {index} collapses to zero frames"
                    )));
                }
                match entry {
                    Entry::Blank { length: blank } => *blank = length,
                    Entry::Clip(clip) => {
                        let source_length = self
                            .project
                            .sources
                            .get(&clip.source_id)
                            .map(|source| source.length)
                            .ok_or_else(|| EditError::SourceNotFound(clip.source_id.clone()))?;
                        let available = slowmotion::variant_length(source_length, clip.speed);
                        let mut in_point = rescaler.position(clip.in_point)?;
                        if in_point + length > available {
                            in_point = available - length;
                        }
                        if in_point < FramePos::ZERO {
                            return Err(EditError::invalid_range(format!(
                                "clip {} no longer fits its producer",
                                clip.id
                            )));
                        }
                        clip.in_point = in_point;
                        clip.out_point = in_point + length;
                    }
                }
                old_cursor = old_end;
                new_cursor = new_end;
            }
        }
        for transition in self.project.transitions.iter_mut() {
            transition.range = rescaler.span(transition.range)?;
        }

        let report = rescaler.finish();
        info!(
            from = %self.project.fps,
            to = %fps,
            values = report.values,
            inexact = report.inexact,
            "timeline rescaled"
        );
        self.project.fps = fps;
        Ok(report)
    }

    fn commit(&mut self, tx: &mut Transaction) -> Result<(), EditError> {
        let Project {
            tracks,
            transitions,
            ..
        } = &mut self.project;
        for track in tracks.iter() {
            track.duration().bounded()?;
        }
        for transition in transitions.revalidate(tracks) {
            warn!(transition_id = %transition.id, tag = %transition.tag, "transition orphaned");
            tx.events.push(TimelineEvent::TransitionRemoved {
                reason: EditError::TransitionOrphaned(transition.id),
                transition,
            });
        }
        self.bind_clips(tx)?;
        self.sync()
    }

    /// Acquires producers for clips that have none yet: freshly inserted
    /// clips, clips moved to another source, and every clip after a load.
    fn bind_clips(&mut self, tx: &mut Transaction) -> Result<(), EditError> {
        let Self {
            project,
            backend,
            variants,
            sources,
            ..
        } = self;
        for track in &mut project.tracks {
            for entry in &mut track.entries {
                let Some(clip) = entry.as_clip_mut() else {
                    continue;
                };
                if clip.producer.is_some() {
                    continue;
                }
                let source = project
                    .sources
                    .get(&clip.source_id)
                    .ok_or_else(|| EditError::SourceNotFound(clip.source_id.clone()))?;
                let source_producer = open_source(backend, sources, source)?;
                let handle = variants.acquire(
                    &mut *backend,
                    source,
                    source_producer,
                    clip.speed,
                    clip.strobe,
                )?;
                tx.acquired.push(handle);
                clip.producer = Some(handle);
            }
        }
        Ok(())
    }

    /// Writes whatever differs from what the engine was last told.
    fn sync(&mut self) -> Result<(), EditError> {
        if self.synced_fps != Some(self.project.fps) {
            self.backend.set_fps(self.project.fps);
            self.synced_fps = Some(self.project.fps);
        }

        let count = self.project.tracks.len();
        if self.backend.track_count() != count {
            self.backend.set_track_count(count);
        }
        self.synced.resize_with(count, SyncedTrack::default);

        for (index, track) in self.project.tracks.iter().enumerate() {
            let synced = &mut self.synced[index];
            let playlist = playlist_of(track);
            if synced.playlist.as_ref() != Some(&playlist) {
                self.backend.set_playlist(index, playlist.clone())?;
                synced.playlist = Some(playlist);
            }
            let state = (track.mute, track.blind);
            if synced.state != Some(state) {
                self.backend.set_track_state(index, state.0, state.1)?;
                synced.state = Some(state);
            }
            let filters = track.effects.active();
            if synced.filters.as_ref() != Some(&filters) {
                self.backend.set_track_filters(index, filters.clone())?;
                synced.filters = Some(filters);
            }
        }

        let desired: Vec<(Uuid, PlantedTransition, usize, bool)> = self
            .project
            .transitions
            .iter()
            .enumerate()
            .map(|(priority, transition)| {
                (
                    transition.id,
                    planted_spec(transition),
                    priority,
                    transition.inverted,
                )
            })
            .collect();

        let stale: Vec<Uuid> = self
            .planted
            .iter()
            .filter(|(id, planted)| {
                !desired.iter().any(|(wanted, spec, priority, _)| {
                    wanted == *id && *spec == planted.spec && *priority == planted.priority
                })
            })
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(planted) = self.planted.get(&id) {
                self.backend.remove_transition(planted.handle)?;
                self.planted.remove(&id);
            }
        }

        for (id, spec, priority, inverted) in desired {
            if !self.planted.contains_key(&id) {
                let handle = self.backend.plant_transition(spec.clone(), priority)?;
                debug!(transition_id = %id, %handle, priority, "transition planted");
                self.planted.insert(
                    id,
                    Planted {
                        handle,
                        spec,
                        priority,
                        inverted: false,
                    },
                );
            }
            if let Some(planted) = self.planted.get_mut(&id)
                && planted.inverted != inverted
            {
                self.backend.set_transition_property(
                    planted.handle,
                    REVERSE_PROPERTY,
                    if inverted { "1" } else { "0" },
                )?;
                planted.inverted = inverted;
            }
        }
        Ok(())
    }

    fn finish(&mut self, tx: Transaction) {
        for handle in tx.released {
            if let Err(error) = self.variants.release(&mut self.backend, handle) {
                warn!(%handle, %error, "deferred release failed");
            }
        }
        for (source_id, handle) in &tx.sources {
            if self.sources.get(source_id) != Some(handle) {
                self.destroy(*handle);
            }
        }

        self.project.touch();
        self.revision += 1;
        self.state = ProjectorState::Committed;
        let revision = self.revision;
        for event in tx.events {
            self.publish(&event);
        }
        self.publish(&TimelineEvent::FrameUpdated { revision });
        self.state = ProjectorState::Idle;
    }

    fn rollback(&mut self, tx: Transaction) {
        self.project = tx.snapshot;
        if let Err(error) = self.sync() {
            warn!(%error, "engine resync after rollback failed");
        }
        for handle in tx.acquired.into_iter().rev() {
            if let Err(error) = self.variants.release(&mut self.backend, handle) {
                warn!(%handle, %error, "release after rollback failed");
            }
        }
        let opened: Vec<ProducerHandle> = self
            .sources
            .iter()
            .filter(|(source_id, handle)| tx.sources.get(*source_id) != Some(*handle))
            .map(|(_, handle)| *handle)
            .collect();
        for handle in opened {
            self.destroy(handle);
        }
        self.sources = tx.sources;
        self.state = ProjectorState::RolledBack;
        self.state = ProjectorState::Idle;
    }

    fn destroy(&mut self, handle: ProducerHandle) {
        if let Err(error) = self.backend.destroy_producer(handle) {
            warn!(%handle, %error, "failed to destroy producer");
        }
    }

    fn publish(&mut self, event: &TimelineEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

fn open_source<B: RenderBackend>(
    backend: &mut B,
    sources: &mut HashMap<String, ProducerHandle>,
    source: &Source,
) -> Result<ProducerHandle, EditError> {
    if let Some(handle) = sources.get(&source.id) {
        return Ok(*handle);
    }
    let handle = backend
        .create_producer(source.resource_in_use())
        .map_err(|error| EditError::ProducerUnavailable {
            source_id: source.id.clone(),
            reason: Unavailable::from(error),
        })?;
    debug!(source_id = %source.id, %handle, "source producer opened");
    sources.insert(source.id.clone(), handle);
    Ok(handle)
}

/// Engine-side rendition of a track. Unbound clips only exist while a failed
/// open is being rolled back; they render as blanks.
fn playlist_of(track: &Track) -> Vec<PlaylistEntry> {
    track
        .entries
        .iter()
        .map(|entry| match entry {
            Entry::Blank { length } => PlaylistEntry::Blank { length: *length },
            Entry::Clip(clip) => match clip.producer {
                Some(producer) => PlaylistEntry::Clip {
                    producer,
                    in_point: clip.in_point,
                    out_point: clip.out_point,
                    filters: clip.effects.active(),
                },
                None => PlaylistEntry::Blank {
                    length: clip.duration(),
                },
            },
        })
        .collect()
}

fn planted_spec(transition: &Transition) -> PlantedTransition {
    PlantedTransition {
        tag: transition.tag.clone(),
        a_track: transition.a_track,
        b_track: transition.b_track,
        range: transition.range,
        params: transition.params.clone(),
    }
}

const fn default_speed() -> f64 {
    DEFAULT_SPEED
}

const fn default_strobe() -> u32 {
    DEFAULT_STROBE
}
