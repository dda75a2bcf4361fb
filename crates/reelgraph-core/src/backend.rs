//! Command surface of the multitrack rendering engine.
//!
//! The render-graph layer only ever holds small integer handles into the
//! engine. [`crate::projector::Timeline`] is the single component that calls
//! through [`RenderBackend`].

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    effects::EffectSpec,
    time::{FramePos, FrameRange, Fps},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProducerHandle(pub u32);

impl fmt::Display for ProducerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer#{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FieldHandle(pub u32);

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transition#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("resource cannot be opened: {0}")]
    ResourceMissing(String),
    #[error("resource cannot be decoded: {0}")]
    ResourceCorrupt(String),
    #[error("unknown producer {0}")]
    UnknownProducer(ProducerHandle),
    #[error("unknown field entry {0}")]
    UnknownTransition(FieldHandle),
    #[error("track {0} does not exist in the tractor")]
    UnknownTrack(usize),
    #[error("playlist entry {index} does not exist on track {track}")]
    UnknownEntry { track: usize, index: usize },
}

/// One entry of an engine-side playlist.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistEntry {
    Blank {
        length: FramePos,
    },
    Clip {
        producer: ProducerHandle,
        in_point: FramePos,
        out_point: FramePos,
        filters: Vec<EffectSpec>,
    },
}

impl PlaylistEntry {
    #[must_use]
    pub fn length(&self) -> FramePos {
        match self {
            Self::Blank { length } => *length,
            Self::Clip {
                in_point,
                out_point,
                ..
            } => *out_point - *in_point,
        }
    }
}

/// A transition as planted on the engine's field. The inverted flag is not
/// part of the planted identity; it is toggled through a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantedTransition {
    pub tag: String,
    pub a_track: usize,
    pub b_track: usize,
    pub range: FrameRange,
    pub params: BTreeMap<String, String>,
}

pub const REVERSE_PROPERTY: &str = "reverse";

pub trait RenderBackend: Send {
    fn set_fps(&mut self, fps: Fps);

    fn create_producer(&mut self, resource: &str) -> Result<ProducerHandle, BackendError>;
    fn destroy_producer(&mut self, handle: ProducerHandle) -> Result<(), BackendError>;
    fn producer_length(&self, handle: ProducerHandle) -> Result<FramePos, BackendError>;

    fn track_count(&self) -> usize;
    fn set_track_count(&mut self, count: usize);
    fn set_track_state(&mut self, track: usize, mute: bool, blind: bool)
    -> Result<(), BackendError>;
    fn set_track_filters(
        &mut self,
        track: usize,
        filters: Vec<EffectSpec>,
    ) -> Result<(), BackendError>;

    fn set_playlist(
        &mut self,
        track: usize,
        entries: Vec<PlaylistEntry>,
    ) -> Result<(), BackendError>;
    fn playlist_count(&self, track: usize) -> Result<usize, BackendError>;
    fn playlist_entry(&self, track: usize, index: usize) -> Result<PlaylistEntry, BackendError>;
    fn playlist_length(&self, track: usize) -> Result<FramePos, BackendError>;

    fn plant_transition(
        &mut self,
        transition: PlantedTransition,
        priority: usize,
    ) -> Result<FieldHandle, BackendError>;
    fn remove_transition(&mut self, handle: FieldHandle) -> Result<(), BackendError>;
    fn set_transition_property(
        &mut self,
        handle: FieldHandle,
        key: &str,
        value: &str,
    ) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
struct MemoryProducer {
    resource: String,
    length: FramePos,
}

#[derive(Debug, Clone, Default)]
struct MemoryTrack {
    entries: Vec<PlaylistEntry>,
    mute: bool,
    blind: bool,
    filters: Vec<EffectSpec>,
}

#[derive(Debug, Clone)]
struct MemoryTransition {
    transition: PlantedTransition,
    priority: usize,
    properties: BTreeMap<String, String>,
}

/// In-process engine used by the CLI and the test-suite.
///
/// Media is declared up front with [`MemoryBackend::add_media`]. Slow-motion
/// descriptors of the form `framebuffer:{resource}?{speed}[&strobe=n]`
/// resolve against the declared media with the length divided by `|speed|`.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    fps: Fps,
    next_producer: u32,
    next_field: u32,
    media: HashMap<String, FramePos>,
    corrupt: BTreeSet<String>,
    failing_tracks: BTreeSet<usize>,
    producers: BTreeMap<ProducerHandle, MemoryProducer>,
    tracks: Vec<MemoryTrack>,
    field: BTreeMap<FieldHandle, MemoryTransition>,
    plants: usize,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_media(mut self, resource: impl Into<String>, length: i64) -> Self {
        self.add_media(resource, FramePos(length));
        self
    }

    pub fn add_media(&mut self, resource: impl Into<String>, length: FramePos) {
        self.media.insert(resource.into(), length);
    }

    pub fn mark_corrupt(&mut self, resource: impl Into<String>) {
        self.corrupt.insert(resource.into());
    }

    /// Makes every playlist write to `track` fail until cleared.
    pub fn fail_track_writes(&mut self, track: usize, failing: bool) {
        if failing {
            self.failing_tracks.insert(track);
        } else {
            self.failing_tracks.remove(&track);
        }
    }

    #[must_use]
    pub fn fps(&self) -> Fps {
        self.fps
    }

    #[must_use]
    pub fn live_producers(&self) -> usize {
        self.producers.len()
    }

    #[must_use]
    pub fn producer_resource(&self, handle: ProducerHandle) -> Option<&str> {
        self.producers
            .get(&handle)
            .map(|producer| producer.resource.as_str())
    }

    #[must_use]
    pub fn track_state(&self, track: usize) -> Option<(bool, bool)> {
        self.tracks.get(track).map(|state| (state.mute, state.blind))
    }

    #[must_use]
    pub fn track_filters(&self, track: usize) -> Option<&[EffectSpec]> {
        self.tracks.get(track).map(|state| state.filters.as_slice())
    }

    /// Planted transitions in compositing order, bottom first.
    #[must_use]
    pub fn transitions(&self) -> Vec<(FieldHandle, PlantedTransition)> {
        let mut planted: Vec<_> = self
            .field
            .iter()
            .map(|(handle, entry)| (entry.priority, *handle, entry.transition.clone()))
            .collect();
        planted.sort_by_key(|(priority, handle, _)| (*priority, *handle));
        planted
            .into_iter()
            .map(|(_, handle, transition)| (handle, transition))
            .collect()
    }

    #[must_use]
    pub fn transition_property(&self, handle: FieldHandle, key: &str) -> Option<&str> {
        self.field
            .get(&handle)
            .and_then(|entry| entry.properties.get(key))
            .map(String::as_str)
    }

    /// Total number of `plant_transition` calls served.
    #[must_use]
    pub fn plant_count(&self) -> usize {
        self.plants
    }

    fn resolve_length(&self, resource: &str) -> Result<FramePos, BackendError> {
        let (base, speed) = match resource.strip_prefix("framebuffer:") {
            Some(descriptor) => {
                let (base, query) = descriptor
                    .rsplit_once('?')
                    .ok_or_else(|| BackendError::ResourceCorrupt(resource.to_string()))?;
                let speed = query
                    .split('&')
                    .next()
                    .and_then(|value| value.parse::<f64>().ok())
                    .filter(|speed| speed.is_finite() && *speed != 0.0)
                    .ok_or_else(|| BackendError::ResourceCorrupt(resource.to_string()))?;
                (base, speed)
            }
            None => (resource, 1.0),
        };

        if self.corrupt.contains(base) {
            return Err(BackendError::ResourceCorrupt(base.to_string()));
        }
        let length = self
            .media
            .get(base)
            .copied()
            .ok_or_else(|| BackendError::ResourceMissing(base.to_string()))?;
        Ok(FramePos((length.0 as f64 / speed.abs()).round() as i64))
    }

    fn track(&self, track: usize) -> Result<&MemoryTrack, BackendError> {
        self.tracks.get(track).ok_or(BackendError::UnknownTrack(track))
    }

    fn track_mut(&mut self, track: usize) -> Result<&mut MemoryTrack, BackendError> {
        self.tracks
            .get_mut(track)
            .ok_or(BackendError::UnknownTrack(track))
    }
}

impl RenderBackend for MemoryBackend {
    fn set_fps(&mut self, fps: Fps) {
        self.fps = fps;
    }

    fn create_producer(&mut self, resource: &str) -> Result<ProducerHandle, BackendError> {
        let length = self.resolve_length(resource)?;
        self.next_producer += 1;
        let handle = ProducerHandle(self.next_producer);
        self.producers.insert(
            handle,
            MemoryProducer {
                resource: resource.to_string(),
                length,
            },
        );
        debug!(%handle, resource, %length, "producer created");
        Ok(handle)
    }

    fn destroy_producer(&mut self, handle: ProducerHandle) -> Result<(), BackendError> {
        self.producers
            .remove(&handle)
            .ok_or(BackendError::UnknownProducer(handle))?;
        debug!(%handle, "producer destroyed");
        Ok(())
    }

    fn producer_length(&self, handle: ProducerHandle) -> Result<FramePos, BackendError> {
        self.producers
            .get(&handle)
            .map(|producer| producer.length)
            .ok_or(BackendError::UnknownProducer(handle))
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn set_track_count(&mut self, count: usize) {
        self.tracks.resize_with(count, MemoryTrack::default);
    }

    fn set_track_state(
        &mut self,
        track: usize,
        mute: bool,
        blind: bool,
    ) -> Result<(), BackendError> {
        let state = self.track_mut(track)?;
        state.mute = mute;
        state.blind = blind;
        Ok(())
    }

    fn set_track_filters(
        &mut self,
        track: usize,
        filters: Vec<EffectSpec>,
    ) -> Result<(), BackendError> {
        self.track_mut(track)?.filters = filters;
        Ok(())
    }

    fn set_playlist(
        &mut self,
        track: usize,
        entries: Vec<PlaylistEntry>,
    ) -> Result<(), BackendError> {
        if self.failing_tracks.contains(&track) {
            return Err(BackendError::UnknownTrack(track));
        }
        for entry in &entries {
            if let PlaylistEntry::Clip { producer, .. } = entry
                && !self.producers.contains_key(producer)
            {
                return Err(BackendError::UnknownProducer(*producer));
            }
        }
        trace!(track, entries = entries.len(), "playlist replaced");
        self.track_mut(track)?.entries = entries;
        Ok(())
    }

    fn playlist_count(&self, track: usize) -> Result<usize, BackendError> {
        Ok(self.track(track)?.entries.len())
    }

    fn playlist_entry(&self, track: usize, index: usize) -> Result<PlaylistEntry, BackendError> {
        self.track(track)?
            .entries
            .get(index)
            .cloned()
            .ok_or(BackendError::UnknownEntry { track, index })
    }

    fn playlist_length(&self, track: usize) -> Result<FramePos, BackendError> {
        Ok(self
            .track(track)?
            .entries
            .iter()
            .map(PlaylistEntry::length)
            .sum())
    }

    fn plant_transition(
        &mut self,
        transition: PlantedTransition,
        priority: usize,
    ) -> Result<FieldHandle, BackendError> {
        let highest = transition.a_track.max(transition.b_track);
        if highest >= self.tracks.len() {
            return Err(BackendError::UnknownTrack(highest));
        }
        self.next_field += 1;
        self.plants += 1;
        let handle = FieldHandle(self.next_field);
        self.field.insert(
            handle,
            MemoryTransition {
                transition,
                priority,
                properties: BTreeMap::new(),
            },
        );
        Ok(handle)
    }

    fn remove_transition(&mut self, handle: FieldHandle) -> Result<(), BackendError> {
        self.field
            .remove(&handle)
            .map(|_| ())
            .ok_or(BackendError::UnknownTransition(handle))
    }

    fn set_transition_property(
        &mut self,
        handle: FieldHandle,
        key: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        let entry = self
            .field
            .get_mut(&handle)
            .ok_or(BackendError::UnknownTransition(handle))?;
        entry.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
