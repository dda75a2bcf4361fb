//! Mutation primitives on a single track's entry list.
//!
//! Every primitive either succeeds completely or leaves the track as it was.
//! After each successful edit the entry list is normalized: no zero-length
//! entries, no two adjacent blanks, no trailing blank.

use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::{
    backend::ProducerHandle,
    error::EditError,
    model::{ClipInstance, Entry, Track},
    time::{FramePos, FrameRange},
};

/// How an insertion treats a destination that already holds clips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Fail with `OccupiedSpan` if any clip intersects the destination.
    #[default]
    Strict,
    /// Truncate or remove whatever intersects the destination.
    Overwrite,
    /// Ripple everything at or after the destination later.
    Push,
}

impl InsertMode {
    /// Maps the classic flag pair; `overwrite` wins when both are set.
    #[must_use]
    pub fn from_flags(overwrite: bool, push: bool) -> Self {
        match (overwrite, push) {
            (true, _) => Self::Overwrite,
            (false, true) => Self::Push,
            (false, false) => Self::Strict,
        }
    }
}

/// Producer references a playlist edit created or dropped. The caller settles
/// them against the slow-motion cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistChange {
    pub created: Vec<Uuid>,
    pub removed: Vec<ClipInstance>,
    pub duplicated: Vec<ProducerHandle>,
    pub splits: Vec<ClipSplit>,
}

/// A clip cut in two. `head` keeps the original id; `tail` starts at `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipSplit {
    pub head: Uuid,
    pub tail: Uuid,
    pub at: FramePos,
}

impl Track {
    /// Index and span of the entry covering `position`.
    #[must_use]
    pub fn locate(&self, position: FramePos) -> Option<(usize, FrameRange)> {
        self.spans()
            .find(|(_, range, _)| range.contains(position))
            .map(|(index, range, _)| (index, range))
    }

    #[must_use]
    pub fn clip_at(&self, position: FramePos) -> Option<(FrameRange, &ClipInstance)> {
        self.clips().find(|(range, _)| range.contains(position))
    }

    /// True if any clip intersects `range`. Touching ends do not count.
    #[must_use]
    pub fn is_occupied(&self, range: FrameRange) -> bool {
        self.clips().any(|(span, _)| span.overlaps(&range))
    }

    #[must_use]
    pub fn clip_starts(&self) -> Vec<FramePos> {
        self.clips().map(|(range, _)| range.start).collect()
    }

    pub fn insert_clip(
        &mut self,
        track: usize,
        position: FramePos,
        clip: ClipInstance,
        mode: InsertMode,
    ) -> Result<PlaylistChange, EditError> {
        position.bounded()?;
        clip.in_point.bounded()?;
        clip.out_point.bounded()?;
        let duration = clip.duration();
        if !duration.is_positive() {
            return Err(EditError::invalid_range("clip has no duration"));
        }
        if position < FramePos::ZERO {
            return Err(EditError::invalid_range(format!(
                "position {position} is before the timeline start"
            )));
        }

        let span = FrameRange::with_length(position, duration);
        let mut change = PlaylistChange::default();
        let index = match mode {
            InsertMode::Push => {
                if self
                    .clip_at(position)
                    .is_some_and(|(range, _)| range.start != position)
                {
                    return Err(EditError::OccupiedSpan { track, range: span });
                }
                self.split_at(position, &mut change)
            }
            InsertMode::Strict if self.is_occupied(span) => {
                return Err(EditError::OccupiedSpan { track, range: span });
            }
            InsertMode::Strict | InsertMode::Overwrite => self.clear_span(span, &mut change),
        };

        trace!(track, %span, ?mode, clip_id = %clip.id, "clip inserted");
        change.created.push(clip.id);
        self.entries.insert(index, Entry::Clip(clip));
        self.normalize();
        Ok(change)
    }

    /// Replaces the clip covering `position` with a blank of equal length.
    pub fn remove_clip(
        &mut self,
        track: usize,
        position: FramePos,
    ) -> Result<ClipInstance, EditError> {
        let (index, range) = self.clip_index_at(track, position)?;
        let removed = std::mem::replace(
            &mut self.entries[index],
            Entry::Blank {
                length: range.len(),
            },
        );
        self.normalize();
        match removed {
            Entry::Clip(clip) => Ok(clip),
            Entry::Blank { .. } => Err(EditError::ClipNotFound { track, position }),
        }
    }

    pub fn resize_clip_start(
        &mut self,
        clip_id: Uuid,
        new_start: FramePos,
    ) -> Result<(), EditError> {
        new_start.bounded()?;
        let (mut index, range) = self.clip_index_by_id(clip_id)?;
        if new_start < FramePos::ZERO {
            return Err(EditError::invalid_range(format!(
                "start {new_start} is before the timeline start"
            )));
        }
        if new_start >= range.end {
            return Err(EditError::invalid_range("clip would become empty"));
        }

        let delta = new_start - range.start;
        let new_in = self.clip_in(index) + delta;
        if new_in < FramePos::ZERO {
            return Err(EditError::invalid_range(format!(
                "in point {new_in} is before the producer start"
            )));
        }

        if delta < FramePos::ZERO {
            let grow = -delta;
            match index.checked_sub(1).and_then(|prev| self.entries.get_mut(prev)) {
                Some(Entry::Blank { length }) if *length >= grow => *length -= grow,
                _ => {
                    return Err(EditError::invalid_range(format!(
                        "start {new_start} collides with the previous clip"
                    )));
                }
            }
        } else if delta.is_positive() {
            let previous_is_blank = index
                .checked_sub(1)
                .and_then(|prev| self.entries.get(prev))
                .is_some_and(Entry::is_blank);
            if previous_is_blank {
                self.grow_blank(index - 1, delta);
            } else {
                self.entries.insert(index, Entry::Blank { length: delta });
                index += 1;
            }
        }

        if let Some(clip) = self.entries[index].as_clip_mut() {
            clip.in_point = new_in;
        }
        self.normalize();
        Ok(())
    }

    /// `available` is the length of the producer the clip plays.
    pub fn resize_clip_end(
        &mut self,
        clip_id: Uuid,
        new_end: FramePos,
        available: FramePos,
    ) -> Result<(), EditError> {
        new_end.bounded()?;
        let (index, range) = self.clip_index_by_id(clip_id)?;
        let new_duration = new_end - range.start;
        if !new_duration.is_positive() {
            return Err(EditError::invalid_range("clip would become empty"));
        }
        let new_out = self.clip_in(index) + new_duration;
        if new_out > available {
            return Err(EditError::invalid_range(format!(
                "out point {new_out} exceeds producer length {available}"
            )));
        }

        self.reshape_tail(index, range, new_duration)?;
        if let Some(clip) = self.entries[index].as_clip_mut() {
            clip.out_point = new_out;
        }
        self.normalize();
        Ok(())
    }

    /// Shifts in and out together without moving the clip on the timeline.
    pub fn slip_clip(
        &mut self,
        clip_id: Uuid,
        delta: FramePos,
        available: FramePos,
    ) -> Result<(), EditError> {
        delta.bounded()?;
        let (index, _) = self.clip_index_by_id(clip_id)?;
        let Some(clip) = self.entries[index].as_clip_mut() else {
            return Err(EditError::UnknownClip(clip_id));
        };
        let new_in = clip.in_point + delta;
        let new_out = clip.out_point + delta;
        if new_in < FramePos::ZERO || new_out > available {
            return Err(EditError::invalid_range(format!(
                "slip by {delta} leaves producer bounds [0, {available})"
            )));
        }
        clip.in_point = new_in;
        clip.out_point = new_out;
        Ok(())
    }

    /// Sets a new in point and duration, clamping the duration to the room
    /// before the next clip. Returns the duration applied.
    pub fn retime_clip(
        &mut self,
        clip_id: Uuid,
        in_point: FramePos,
        requested: FramePos,
    ) -> Result<FramePos, EditError> {
        let (index, range) = self.clip_index_by_id(clip_id)?;
        let room = match self.entries.get(index + 1) {
            None => None,
            Some(Entry::Blank { length }) => Some(range.len() + *length),
            Some(Entry::Clip(_)) => Some(range.len()),
        };
        let duration = room.map_or(requested, |room| requested.min(room));
        if !duration.is_positive() || in_point < FramePos::ZERO {
            return Err(EditError::invalid_range("retimed clip would be empty"));
        }

        self.reshape_tail(index, range, duration)?;
        if let Some(clip) = self.entries[index].as_clip_mut() {
            clip.in_point = in_point;
            clip.out_point = in_point + duration;
        }
        self.normalize();
        Ok(duration)
    }

    /// Splits the clip strictly containing `position` into two.
    pub fn cut_clip(
        &mut self,
        track: usize,
        position: FramePos,
    ) -> Result<PlaylistChange, EditError> {
        let (_, range) = self.clip_index_at(track, position)?;
        if position == range.start {
            return Err(EditError::invalid_range(format!(
                "cut at {position} is on a clip boundary"
            )));
        }

        let mut change = PlaylistChange::default();
        let tail_index = self.split_at(position, &mut change);
        if let Some(tail) = self.entries.get(tail_index).and_then(Entry::as_clip) {
            change.created.push(tail.id);
        }
        Ok(change)
    }

    /// Ripples everything at or after `offset` by `duration`.
    ///
    /// A ripple point inside a clip leaves that clip in place and grows the
    /// blank that follows it. A negative duration removes blank space at the
    /// same point and never consumes a clip.
    pub fn insert_space(&mut self, offset: FramePos, duration: FramePos) -> Result<(), EditError> {
        offset.bounded()?;
        duration.bounded()?;
        if offset < FramePos::ZERO {
            return Err(EditError::invalid_range(format!(
                "offset {offset} is before the timeline start"
            )));
        }
        if duration == FramePos::ZERO || offset >= self.duration() {
            return Ok(());
        }
        let Some((index, range)) = self.locate(offset) else {
            return Ok(());
        };

        let is_blank = self.entries[index].is_blank();
        let inside_clip = !is_blank && range.start != offset;
        if inside_clip && index + 1 == self.entries.len() {
            return Ok(());
        }

        if duration.is_positive() {
            if is_blank {
                self.grow_blank(index, duration);
            } else if inside_clip {
                if self.entries.get(index + 1).is_some_and(Entry::is_blank) {
                    self.grow_blank(index + 1, duration);
                } else {
                    self.entries
                        .insert(index + 1, Entry::Blank { length: duration });
                }
            } else {
                self.entries.insert(index, Entry::Blank { length: duration });
            }
        } else {
            let amount = -duration;
            let (blank_index, available) = if is_blank {
                (index, range.end - offset)
            } else if inside_clip {
                match self.entries.get(index + 1) {
                    Some(Entry::Blank { length }) => (index + 1, *length),
                    _ => (index + 1, FramePos::ZERO),
                }
            } else {
                (index, FramePos::ZERO)
            };
            if available < amount {
                return Err(EditError::invalid_range(format!(
                    "only {available} blank frames at {offset}, cannot remove {amount}"
                )));
            }
            self.grow_blank(blank_index, duration);
        }

        self.normalize();
        Ok(())
    }

    /// Length of the blank run at `position`, measured from the start of the
    /// run or from `position`. `None` past the last entry, where space is
    /// unbounded; zero inside a clip.
    #[must_use]
    pub fn space_length(&self, position: FramePos, from_blank_start: bool) -> Option<FramePos> {
        if position >= self.duration() {
            return None;
        }
        let Some((index, range)) = self.locate(position) else {
            return Some(FramePos::ZERO);
        };
        if !self.entries[index].is_blank() {
            return Some(FramePos::ZERO);
        }
        Some(if from_blank_start {
            range.len()
        } else {
            range.end - position
        })
    }

    pub fn check_invariants(&self) -> Result<(), EditError> {
        let violation = |reason: String| Err(EditError::invalid_range(reason));
        let mut total = FramePos::ZERO;
        for entry in &self.entries {
            let length = match entry {
                Entry::Blank { length } => length.bounded()?,
                Entry::Clip(clip) => {
                    clip.in_point.bounded()?;
                    clip.out_point.bounded()?;
                    clip.duration()
                }
            };
            total = (total + length).bounded()?;
        }
        for (index, range, entry) in self.spans() {
            if !range.len().is_positive() {
                return violation(format!("entry {index} at {range} is empty"));
            }
            if let Entry::Clip(clip) = entry
                && clip.in_point < FramePos::ZERO
            {
                return violation(format!("clip {} starts before its producer", clip.id));
            }
            if index > 0 && entry.is_blank() && self.entries[index - 1].is_blank() {
                return violation(format!("blanks at entry {index} are not merged"));
            }
        }
        if self.entries.last().is_some_and(Entry::is_blank) {
            return violation("track ends with a blank".to_string());
        }
        Ok(())
    }

    pub(crate) fn clip_index_at(
        &self,
        track: usize,
        position: FramePos,
    ) -> Result<(usize, FrameRange), EditError> {
        self.spans()
            .find(|(_, range, entry)| !entry.is_blank() && range.contains(position))
            .map(|(index, range, _)| (index, range))
            .ok_or(EditError::ClipNotFound { track, position })
    }

    pub(crate) fn clip_index_by_id(
        &self,
        clip_id: Uuid,
    ) -> Result<(usize, FrameRange), EditError> {
        self.spans()
            .find(|(_, _, entry)| entry.as_clip().is_some_and(|clip| clip.id == clip_id))
            .map(|(index, range, _)| (index, range))
            .ok_or(EditError::UnknownClip(clip_id))
    }

    fn clip_in(&self, index: usize) -> FramePos {
        self.entries[index]
            .as_clip()
            .map_or(FramePos::ZERO, |clip| clip.in_point)
    }

    fn grow_blank(&mut self, index: usize, delta: FramePos) {
        if let Some(Entry::Blank { length }) = self.entries.get_mut(index) {
            *length += delta;
        }
    }

    /// Makes room for the clip at `index` to span `new_duration`, taking from
    /// or giving back to the blank that follows it.
    fn reshape_tail(
        &mut self,
        index: usize,
        range: FrameRange,
        new_duration: FramePos,
    ) -> Result<(), EditError> {
        let delta = new_duration - range.len();
        if delta.is_positive() {
            match self.entries.get_mut(index + 1) {
                None => {}
                Some(Entry::Blank { length }) if *length >= delta => *length -= delta,
                Some(_) => {
                    return Err(EditError::invalid_range(format!(
                        "end {} collides with the next clip",
                        range.start + new_duration
                    )));
                }
            }
        } else if delta < FramePos::ZERO {
            let shrink = -delta;
            if matches!(self.entries.get(index + 1), Some(Entry::Clip(_))) {
                self.entries
                    .insert(index + 1, Entry::Blank { length: shrink });
            } else {
                self.grow_blank(index + 1, shrink);
            }
        }
        Ok(())
    }

    /// Ensures an entry boundary at `position` and returns the index of the
    /// entry starting there. Pads with a blank past the end.
    fn split_at(&mut self, position: FramePos, change: &mut PlaylistChange) -> usize {
        let total = self.duration();
        if position >= total {
            if position > total {
                self.entries.push(Entry::Blank {
                    length: position - total,
                });
            }
            return self.entries.len();
        }
        let Some((index, range)) = self.locate(position) else {
            return self.entries.len();
        };
        if range.start == position {
            return index;
        }

        let offset = position - range.start;
        let tail = match &mut self.entries[index] {
            Entry::Blank { length } => {
                let rest = *length - offset;
                *length = offset;
                Entry::Blank { length: rest }
            }
            Entry::Clip(clip) => {
                let tail = clip.split_off(offset);
                if let Some(handle) = tail.producer {
                    change.duplicated.push(handle);
                }
                change.splits.push(ClipSplit {
                    head: clip.id,
                    tail: tail.id,
                    at: position,
                });
                Entry::Clip(tail)
            }
        };
        self.entries.insert(index + 1, tail);
        index + 1
    }

    /// Removes everything inside `span`, splitting entries at its edges, and
    /// returns the index where `span` now begins.
    fn clear_span(&mut self, span: FrameRange, change: &mut PlaylistChange) -> usize {
        let first = self.split_at(span.start, change);
        let last = self.split_at(span.end, change);
        for entry in self.entries.drain(first..last) {
            if let Entry::Clip(clip) = entry {
                change.removed.push(clip);
            }
        }
        first
    }

    fn normalize(&mut self) {
        let mut merged: Vec<Entry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if !entry.duration().is_positive() && entry.is_blank() {
                continue;
            }
            if let (Entry::Blank { length }, Some(Entry::Blank { length: previous })) =
                (&entry, merged.last_mut())
            {
                *previous += *length;
                continue;
            }
            merged.push(entry);
        }
        while merged.last().is_some_and(Entry::is_blank) {
            merged.pop();
        }
        self.entries = merged;
    }
}

/// Moves the clip covering `position` on `from` to `new_position` on `to`.
///
/// Validated as one step against copies of the tracks involved: if the
/// destination refuses the clip, neither track changes.
pub fn move_clip(
    tracks: &mut [Track],
    from: usize,
    position: FramePos,
    to: usize,
    new_position: FramePos,
    mode: InsertMode,
) -> Result<(Uuid, PlaylistChange), EditError> {
    let mut source = tracks.get(from).ok_or(EditError::TrackNotFound(from))?.clone();
    if to >= tracks.len() {
        return Err(EditError::TrackNotFound(to));
    }

    let clip = source.remove_clip(from, position)?;
    let clip_id = clip.id;
    let mut change = if from == to {
        let change = source.insert_clip(to, new_position, clip, mode)?;
        tracks[from] = source;
        change
    } else {
        let mut destination = tracks[to].clone();
        let change = destination.insert_clip(to, new_position, clip, mode)?;
        tracks[from] = source;
        tracks[to] = destination;
        change
    };
    change.created.retain(|id| *id != clip_id);
    Ok((clip_id, change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackKind;

    fn clip(length: i64) -> ClipInstance {
        ClipInstance::new("src", FramePos(0), FramePos(length))
    }

    fn layout(track: &Track) -> Vec<(bool, i64)> {
        track
            .entries
            .iter()
            .map(|entry| (entry.is_blank(), entry.duration().frames()))
            .collect()
    }

    fn track_with(clips: &[(i64, i64)]) -> Track {
        let mut track = Track::new("V1", TrackKind::Video);
        for (start, length) in clips {
            track
                .insert_clip(0, FramePos(*start), clip(*length), InsertMode::Strict)
                .expect("fixture insert");
        }
        track
    }

    #[test]
    fn insert_past_end_pads_with_blank() {
        let track = track_with(&[(0, 10), (20, 5)]);
        assert_eq!(layout(&track), vec![(false, 10), (true, 10), (false, 5)]);
        assert_eq!(track.clip_starts(), vec![FramePos(0), FramePos(20)]);
        track.check_invariants().expect("invariants hold");
    }

    #[test]
    fn strict_insert_refuses_overlap_but_accepts_adjacency() {
        let mut track = track_with(&[(0, 10), (20, 5)]);
        let err = track
            .insert_clip(0, FramePos(5), clip(10), InsertMode::Strict)
            .unwrap_err();
        assert!(matches!(err, EditError::OccupiedSpan { track: 0, .. }));

        track
            .insert_clip(0, FramePos(10), clip(10), InsertMode::Strict)
            .expect("exactly fills the gap");
        assert_eq!(layout(&track), vec![(false, 10), (false, 10), (false, 5)]);
    }

    #[test]
    fn overwrite_truncates_neighbours_and_reports_removed() {
        let mut track = track_with(&[(0, 10), (10, 10)]);
        let change = track
            .insert_clip(0, FramePos(5), clip(10), InsertMode::Overwrite)
            .expect("overwrite");
        assert_eq!(layout(&track), vec![(false, 5), (false, 10), (false, 5)]);
        assert_eq!(change.removed.len(), 2);
        let tail = track.entries[2].as_clip().expect("tail clip");
        assert_eq!(tail.in_point, FramePos(5));
    }

    #[test]
    fn cuts_report_head_and_tail() {
        let mut track = track_with(&[(0, 10), (20, 10)]);
        let head = track.entries[0].as_clip().expect("clip").id;
        let change = track.cut_clip(0, FramePos(4)).expect("inside the first clip");
        let tail = track.entries[1].as_clip().expect("tail clip").id;
        assert_eq!(change.created, vec![tail]);
        assert_eq!(
            change.splits,
            vec![ClipSplit {
                head,
                tail,
                at: FramePos(4)
            }]
        );

        let change = track
            .insert_clip(0, FramePos(22), clip(4), InsertMode::Overwrite)
            .expect("overwrite inside the second clip");
        assert_eq!(change.splits.len(), 2);
        assert_eq!(change.splits[0].at, FramePos(22));
        assert_eq!(change.splits[1].head, change.splits[0].tail);
    }

    #[test]
    fn extreme_positions_are_refused() {
        let mut track = track_with(&[(0, 10)]);
        let id = track.entries[0].as_clip().expect("clip").id;
        assert!(
            track
                .insert_clip(0, FramePos(i64::MAX), clip(4), InsertMode::Strict)
                .is_err()
        );
        assert!(track.insert_space(FramePos(5), FramePos(i64::MIN)).is_err());
        assert!(track.resize_clip_start(id, FramePos(i64::MIN)).is_err());
        assert!(track.slip_clip(id, FramePos(i64::MAX), FramePos(10)).is_err());
        assert_eq!(layout(&track), vec![(false, 10)]);

        track.entries.push(Entry::Blank {
            length: FramePos(i64::MAX),
        });
        track.entries.push(Entry::Clip(clip(i64::MAX)));
        assert!(track.check_invariants().is_err());
    }

    #[test]
    fn push_ripples_later_entries() {
        let mut track = track_with(&[(0, 10), (10, 10)]);
        track
            .insert_clip(0, FramePos(10), clip(4), InsertMode::Push)
            .expect("push at boundary");
        assert_eq!(track.clip_starts(), vec![FramePos(0), FramePos(10), FramePos(14)]);

        let err = track
            .insert_clip(0, FramePos(2), clip(4), InsertMode::Push)
            .unwrap_err();
        assert!(matches!(err, EditError::OccupiedSpan { .. }));
    }

    #[test]
    fn resize_never_overwrites() {
        let mut track = track_with(&[(0, 10), (15, 10)]);
        let first = track.entries[0].as_clip().expect("clip").id;
        let second = track.entries[2].as_clip().expect("clip").id;

        track
            .resize_clip_end(first, FramePos(15), FramePos(100))
            .expect("grows into blank");
        assert_eq!(layout(&track), vec![(false, 15), (false, 10)]);
        assert!(track.resize_clip_end(first, FramePos(16), FramePos(100)).is_err());
        assert!(track.resize_clip_end(first, FramePos(12), FramePos(11)).is_err());

        assert!(track.resize_clip_start(second, FramePos(14)).is_err());
        track
            .resize_clip_start(second, FramePos(18))
            .expect("shrinks from the left");
        assert_eq!(layout(&track), vec![(false, 15), (true, 3), (false, 7)]);
        let resized = track.entries[2].as_clip().expect("clip");
        assert_eq!(resized.in_point, FramePos(3));
    }

    #[test]
    fn insert_space_inside_clip_grows_trailing_blank() {
        let mut track = track_with(&[(0, 10), (10, 10)]);
        track
            .insert_space(FramePos(5), FramePos(3))
            .expect("ripple inside first clip");
        assert_eq!(layout(&track), vec![(false, 10), (true, 3), (false, 10)]);

        track
            .insert_space(FramePos(5), FramePos(-3))
            .expect("inverse ripple");
        assert_eq!(layout(&track), vec![(false, 10), (false, 10)]);

        assert!(track.insert_space(FramePos(10), FramePos(-1)).is_err());
    }

    #[test]
    fn space_length_measures_blank_runs() {
        let track = track_with(&[(0, 10), (30, 10)]);
        assert_eq!(track.space_length(FramePos(15), true), Some(FramePos(20)));
        assert_eq!(track.space_length(FramePos(15), false), Some(FramePos(15)));
        assert_eq!(track.space_length(FramePos(5), true), Some(FramePos(0)));
        assert_eq!(track.space_length(FramePos(40), true), None);
    }

    #[test]
    fn failed_move_leaves_both_tracks_untouched() {
        let mut tracks = vec![track_with(&[(0, 10)]), track_with(&[(0, 20)])];
        let before = tracks.clone();
        let err = move_clip(&mut tracks, 0, FramePos(0), 1, FramePos(5), InsertMode::Strict)
            .unwrap_err();
        assert!(matches!(err, EditError::OccupiedSpan { track: 1, .. }));
        assert_eq!(tracks, before);

        let (clip_id, change) =
            move_clip(&mut tracks, 0, FramePos(0), 1, FramePos(20), InsertMode::Strict)
                .expect("free destination");
        assert!(change.created.is_empty());
        assert!(tracks[0].entries.is_empty());
        assert_eq!(tracks[1].clip_span(clip_id), Some(FrameRange::from_frames(20, 30)));
    }
}
