//! Transitions planted on the shared compositing field.
//!
//! The field is kept in z-order: later entries composite on top of earlier
//! ones. Each transition remembers the clips it bridges so that edits to
//! those clips can clamp or drop it. A clip-bound composite instead spans its
//! clip exactly and follows it across moves, resizes and track changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::EditError,
    model::Track,
    playlist::ClipSplit,
    time::{FramePos, FrameRange},
};

/// Tag planted for clip-bound composites.
pub const CLIP_COMPOSITE_TAG: &str = "composite";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub id: Uuid,
    pub tag: String,
    pub a_track: usize,
    pub b_track: usize,
    pub range: FrameRange,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_clip: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_clip: Option<Uuid>,
    /// Spans `b_clip` exactly and composites it onto `a_track` wherever the
    /// clip goes.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub follows_clip: bool,
}

impl Transition {
    /// `(a, b)` with the inversion applied.
    #[must_use]
    pub fn effective_tracks(&self) -> (usize, usize) {
        if self.inverted {
            (self.b_track, self.a_track)
        } else {
            (self.a_track, self.b_track)
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        describe(&self.tag, self.a_track, self.b_track, self.range)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub tag: String,
    pub a_track: usize,
    pub b_track: usize,
    pub range: FrameRange,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl TransitionRequest {
    #[must_use]
    pub fn new(tag: impl Into<String>, a_track: usize, b_track: usize, range: FrameRange) -> Self {
        Self {
            tag: tag.into(),
            a_track,
            b_track,
            range,
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TransitionField {
    transitions: Vec<Transition>,
}

impl TransitionField {
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Bottom-most first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> + '_ {
        self.transitions.iter()
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Transition> {
        self.transitions.iter().find(|transition| transition.id == id)
    }

    /// Z-order slot of the transition, 0 being the bottom.
    #[must_use]
    pub fn z_order(&self, id: Uuid) -> Option<usize> {
        self.transitions
            .iter()
            .position(|transition| transition.id == id)
    }

    #[must_use]
    pub fn find(
        &self,
        tag: &str,
        a_track: usize,
        b_track: usize,
        range: FrameRange,
    ) -> Option<&Transition> {
        self.transitions.iter().find(|transition| {
            transition.tag == tag
                && transition.a_track == a_track
                && transition.b_track == b_track
                && transition.range == range
        })
    }

    /// Plants a new transition on top of the field.
    pub fn attach(
        &mut self,
        tracks: &[Track],
        request: TransitionRequest,
    ) -> Result<Uuid, EditError> {
        let (a_clip, b_clip) =
            resolve_bridge(tracks, request.a_track, request.b_track, request.range)?;
        let transition = Transition {
            id: Uuid::new_v4(),
            tag: request.tag,
            a_track: request.a_track,
            b_track: request.b_track,
            range: request.range,
            params: request.params,
            inverted: false,
            a_clip,
            b_clip,
            follows_clip: false,
        };
        let id = transition.id;
        debug!(%id, transition = %transition.describe(), "transition attached");
        self.transitions.push(transition);
        Ok(id)
    }

    /// Composites `clip_id` onto `target_track` for the clip's whole span.
    /// A clip carries at most one such composite.
    pub fn attach_to_clip(
        &mut self,
        tracks: &[Track],
        clip_id: Uuid,
        target_track: usize,
        params: BTreeMap<String, String>,
    ) -> Result<Uuid, EditError> {
        let (track, span) = locate_clip(tracks, clip_id).ok_or(EditError::UnknownClip(clip_id))?;
        if target_track >= tracks.len() {
            return Err(EditError::TrackNotFound(target_track));
        }
        if target_track == track {
            return Err(EditError::invalid_range(format!(
                "clip {clip_id} cannot composite onto its own track {track}"
            )));
        }
        if self.clip_bound(clip_id).is_some() {
            return Err(EditError::invalid_range(format!(
                "clip {clip_id} already carries a composite"
            )));
        }
        let transition = Transition {
            id: Uuid::new_v4(),
            tag: CLIP_COMPOSITE_TAG.to_string(),
            a_track: target_track,
            b_track: track,
            range: span,
            params,
            inverted: false,
            a_clip: None,
            b_clip: Some(clip_id),
            follows_clip: true,
        };
        let id = transition.id;
        debug!(%id, %clip_id, transition = %transition.describe(), "clip composite attached");
        self.transitions.push(transition);
        Ok(id)
    }

    #[must_use]
    pub fn clip_bound(&self, clip_id: Uuid) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|transition| transition.follows_clip && transition.b_clip == Some(clip_id))
    }

    pub fn detach(
        &mut self,
        tag: &str,
        a_track: usize,
        b_track: usize,
        range: FrameRange,
    ) -> Result<Transition, EditError> {
        let id = self
            .find(tag, a_track, b_track, range)
            .map(|transition| transition.id)
            .ok_or_else(|| {
                EditError::TransitionNotFound(describe(tag, a_track, b_track, range))
            })?;
        self.remove(id)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Transition, EditError> {
        let slot = self.slot(id)?;
        Ok(self.transitions.remove(slot))
    }

    /// Moves a transition to new tracks and range, keeping its id and
    /// z-order. The bridged clips are resolved again at the destination.
    pub fn move_to(
        &mut self,
        tracks: &[Track],
        id: Uuid,
        a_track: usize,
        b_track: usize,
        range: FrameRange,
    ) -> Result<(), EditError> {
        let slot = self.slot(id)?;
        if self.transitions[slot].follows_clip {
            return Err(EditError::invalid_range(format!(
                "transition {id} is bound to its clip and moves with it"
            )));
        }
        let (a_clip, b_clip) = resolve_bridge(tracks, a_track, b_track, range)?;
        let transition = &mut self.transitions[slot];
        transition.a_track = a_track;
        transition.b_track = b_track;
        transition.range = range;
        transition.a_clip = a_clip;
        transition.b_clip = b_clip;
        Ok(())
    }

    pub fn update_params(
        &mut self,
        id: Uuid,
        params: BTreeMap<String, String>,
    ) -> Result<(), EditError> {
        let slot = self.slot(id)?;
        self.transitions[slot].params.extend(params);
        Ok(())
    }

    /// Swaps the transition type, replacing its parameters.
    pub fn update_type(
        &mut self,
        id: Uuid,
        tag: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Result<(), EditError> {
        let slot = self.slot(id)?;
        let transition = &mut self.transitions[slot];
        transition.tag = tag.into();
        transition.params = params;
        Ok(())
    }

    /// Flips the a/b roles. Returns the new inversion state.
    pub fn invert(&mut self, id: Uuid) -> Result<bool, EditError> {
        let slot = self.slot(id)?;
        let transition = &mut self.transitions[slot];
        transition.inverted = !transition.inverted;
        Ok(transition.inverted)
    }

    pub fn reorder(&mut self, id: Uuid, z_order: usize) -> Result<(), EditError> {
        let slot = self.slot(id)?;
        if z_order >= self.transitions.len() {
            return Err(EditError::invalid_range(format!(
                "z-order {z_order} exceeds {} transitions",
                self.transitions.len()
            )));
        }
        let transition = self.transitions.remove(slot);
        self.transitions.insert(z_order, transition);
        Ok(())
    }

    /// Shifts transitions living on `tracks` whose range starts at or after
    /// `offset`.
    pub fn shift_from(&mut self, tracks: &[usize], offset: FramePos, delta: FramePos) {
        for transition in &mut self.transitions {
            if tracks.contains(&transition.b_track) && transition.range.start >= offset {
                transition.range = transition.range.shifted(delta);
            }
        }
    }

    /// Hands transitions lying after a cut point over to the tail clip.
    pub fn follow_split(&mut self, split: &ClipSplit) {
        for transition in &mut self.transitions {
            if transition.follows_clip || transition.range.start < split.at {
                continue;
            }
            for clip in [&mut transition.a_clip, &mut transition.b_clip] {
                if *clip == Some(split.head) {
                    *clip = Some(split.tail);
                }
            }
        }
    }

    /// Clamps every transition to the overlap of the clips it bridges and
    /// drops the ones whose overlap vanished. Clip-bound composites are
    /// re-spanned onto their clip instead. Returns the dropped transitions.
    pub fn revalidate(&mut self, tracks: &[Track]) -> Vec<Transition> {
        let mut removed = Vec::new();
        self.transitions.retain_mut(|transition| {
            if transition.follows_clip {
                let followed = transition
                    .b_clip
                    .and_then(|clip_id| locate_clip(tracks, clip_id))
                    .filter(|(track, _)| *track != transition.a_track);
                let Some((track, span)) = followed else {
                    removed.push(transition.clone());
                    return false;
                };
                if (track, span) != (transition.b_track, transition.range) {
                    debug!(id = %transition.id, track, %span, "clip composite followed its clip");
                    transition.b_track = track;
                    transition.range = span;
                }
                return true;
            }
            match bridged_overlap(tracks, transition) {
                Some(range) => {
                    if range != transition.range {
                        debug!(
                            id = %transition.id,
                            from = %transition.range,
                            to = %range,
                            "transition clamped to bridged overlap"
                        );
                        transition.range = range;
                    }
                    true
                }
                None => {
                    removed.push(transition.clone());
                    false
                }
            }
        });
        removed
    }

    pub fn on_track_inserted(&mut self, index: usize) {
        for transition in &mut self.transitions {
            if transition.a_track >= index {
                transition.a_track += 1;
            }
            if transition.b_track >= index {
                transition.b_track += 1;
            }
        }
    }

    /// Renumbers after a track removal and returns the transitions that
    /// touched the removed track.
    pub fn on_track_removed(&mut self, index: usize) -> Vec<Transition> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.transitions)
            .into_iter()
            .partition(|transition| transition.a_track == index || transition.b_track == index);
        self.transitions = kept;
        for transition in &mut self.transitions {
            if transition.a_track > index {
                transition.a_track -= 1;
            }
            if transition.b_track > index {
                transition.b_track -= 1;
            }
        }
        removed
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Transition> + '_ {
        self.transitions.iter_mut()
    }

    fn slot(&self, id: Uuid) -> Result<usize, EditError> {
        self.z_order(id)
            .ok_or_else(|| EditError::TransitionNotFound(id.to_string()))
    }
}

impl FromIterator<Transition> for TransitionField {
    fn from_iter<I: IntoIterator<Item = Transition>>(iter: I) -> Self {
        Self {
            transitions: iter.into_iter().collect(),
        }
    }
}

fn describe(tag: &str, a_track: usize, b_track: usize, range: FrameRange) -> String {
    format!("{tag} {a_track}->{b_track} {range}")
}

/// The clip on `track` sharing the most frames with `range`.
fn bridged_clip(track: &Track, range: FrameRange) -> Option<(Uuid, FrameRange)> {
    track
        .clips()
        .filter_map(|(span, clip)| {
            span.intersect(&range)
                .map(|overlap| (overlap.len(), span, clip.id))
        })
        .max_by_key(|(length, _, _)| *length)
        .map(|(_, span, id)| (id, span))
}

fn resolve_bridge(
    tracks: &[Track],
    a_track: usize,
    b_track: usize,
    range: FrameRange,
) -> Result<(Option<Uuid>, Option<Uuid>), EditError> {
    if range.is_empty() {
        return Err(EditError::invalid_range(format!(
            "transition range {range} is empty"
        )));
    }
    if a_track == b_track {
        return Err(EditError::invalid_range(format!(
            "transition needs two distinct tracks, got {a_track} twice"
        )));
    }
    let a = tracks.get(a_track).ok_or(EditError::TrackNotFound(a_track))?;
    let b = tracks.get(b_track).ok_or(EditError::TrackNotFound(b_track))?;

    let a_clip = bridged_clip(a, range);
    let b_clip = bridged_clip(b, range);
    if a_clip.is_none() && b_clip.is_none() {
        return Err(EditError::invalid_range(format!(
            "no clip under transition range {range}"
        )));
    }

    let within = a_clip
        .iter()
        .chain(b_clip.iter())
        .all(|(_, span)| span.contains_range(&range));
    if !within {
        return Err(EditError::invalid_range(format!(
            "transition range {range} leaves the overlap of its clips"
        )));
    }
    Ok((a_clip.map(|(id, _)| id), b_clip.map(|(id, _)| id)))
}

fn locate_clip(tracks: &[Track], clip_id: Uuid) -> Option<(usize, FrameRange)> {
    tracks
        .iter()
        .enumerate()
        .find_map(|(index, track)| track.clip_span(clip_id).map(|span| (index, span)))
}

fn bridged_overlap(tracks: &[Track], transition: &Transition) -> Option<FrameRange> {
    let mut overlap = transition.range;
    for (track, clip) in [
        (transition.a_track, transition.a_clip),
        (transition.b_track, transition.b_clip),
    ] {
        let track = tracks.get(track)?;
        let Some(clip_id) = clip else {
            continue;
        };
        let span = track.clip_span(clip_id)?;
        overlap = overlap.intersect(&span)?;
    }
    Some(overlap)
}
