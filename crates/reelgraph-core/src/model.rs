use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    backend::ProducerHandle,
    effects::EffectStack,
    slowmotion,
    time::{Fps, FramePos, FrameRange},
    transitions::TransitionField,
};

pub const DEFAULT_SPEED: f64 = 1.0;
pub const DEFAULT_STROBE: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub session_id: Uuid,
    pub title: String,
    pub fps: Fps,
    #[serde(default)]
    pub sources: BTreeMap<String, Source>,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub transitions: TransitionField,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    #[must_use]
    pub fn new(title: impl Into<String>, fps: Fps) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            title: title.into(),
            fps,
            sources: BTreeMap::new(),
            tracks: Vec::new(),
            transitions: TransitionField::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(Track::clip_count).sum()
    }

    #[must_use]
    pub fn duration(&self) -> FramePos {
        self.tracks
            .iter()
            .map(Track::duration)
            .max()
            .unwrap_or_default()
    }
}

/// A registered producer the clips draw from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub resource: String,
    pub length: FramePos,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Source {
    #[must_use]
    pub fn new(id: impl Into<String>, resource: impl Into<String>, length: FramePos) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            length,
            proxy: None,
        }
    }

    /// The descriptor the engine should open: the proxy when one is set.
    #[must_use]
    pub fn resource_in_use(&self) -> &str {
        self.proxy.as_deref().unwrap_or(&self.resource)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub kind: TrackKind,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub blind: bool,
    #[serde(default, skip_serializing_if = "EffectStack::is_empty")]
    pub effects: EffectStack,
    pub entries: Vec<Entry>,
}

impl Track {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            mute: false,
            blind: false,
            effects: EffectStack::new(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn duration(&self) -> FramePos {
        self.entries.iter().map(Entry::duration).sum()
    }

    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_blank()).count()
    }

    /// Every entry with its absolute span.
    pub fn spans(&self) -> impl Iterator<Item = (usize, FrameRange, &Entry)> + '_ {
        let mut cursor = FramePos::ZERO;
        self.entries.iter().enumerate().map(move |(index, entry)| {
            let range = FrameRange::with_length(cursor, entry.duration());
            cursor = range.end;
            (index, range, entry)
        })
    }

    /// Clips with their absolute spans.
    pub fn clips(&self) -> impl Iterator<Item = (FrameRange, &ClipInstance)> + '_ {
        self.spans()
            .filter_map(|(_, range, entry)| entry.as_clip().map(|clip| (range, clip)))
    }

    #[must_use]
    pub fn clip_span(&self, clip_id: Uuid) -> Option<FrameRange> {
        self.clips()
            .find(|(_, clip)| clip.id == clip_id)
            .map(|(range, _)| range)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    Blank { length: FramePos },
    Clip(ClipInstance),
}

impl Entry {
    #[must_use]
    pub fn duration(&self) -> FramePos {
        match self {
            Self::Blank { length } => *length,
            Self::Clip(clip) => clip.duration(),
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank { .. })
    }

    #[must_use]
    pub fn as_clip(&self) -> Option<&ClipInstance> {
        match self {
            Self::Clip(clip) => Some(clip),
            Self::Blank { .. } => None,
        }
    }

    pub fn as_clip_mut(&mut self) -> Option<&mut ClipInstance> {
        match self {
            Self::Clip(clip) => Some(clip),
            Self::Blank { .. } => None,
        }
    }
}

/// A placed, trimmed reference to a source. `in_point`/`out_point` are local
/// to the producer actually played, i.e. the slow-motion variant when the
/// clip is speed-altered. `out_point` is exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipInstance {
    pub id: Uuid,
    pub source_id: String,
    pub in_point: FramePos,
    pub out_point: FramePos,
    #[serde(default = "default_speed", skip_serializing_if = "is_default_speed")]
    pub speed: f64,
    #[serde(default = "default_strobe", skip_serializing_if = "is_default_strobe")]
    pub strobe: u32,
    #[serde(default, skip_serializing_if = "EffectStack::is_empty")]
    pub effects: EffectStack,
    /// Engine producer this clip is bound to; established on first projection.
    #[serde(skip)]
    pub producer: Option<ProducerHandle>,
}

impl ClipInstance {
    #[must_use]
    pub fn new(source_id: impl Into<String>, in_point: FramePos, out_point: FramePos) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source_id.into(),
            in_point,
            out_point,
            speed: DEFAULT_SPEED,
            strobe: DEFAULT_STROBE,
            effects: EffectStack::new(),
            producer: None,
        }
    }

    #[must_use]
    pub fn duration(&self) -> FramePos {
        self.out_point - self.in_point
    }

    /// Splits this clip `offset` frames after its start. `self` keeps the
    /// head; the returned tail gets a fresh id, the same producer binding and
    /// a copy of the effect list.
    #[must_use]
    pub fn split_off(&mut self, offset: FramePos) -> Self {
        let split_point = self.in_point + offset;
        let mut tail = self.clone();
        tail.id = Uuid::new_v4();
        tail.in_point = split_point;
        self.out_point = split_point;
        tail
    }
}

const fn default_speed() -> f64 {
    DEFAULT_SPEED
}

const fn default_strobe() -> u32 {
    DEFAULT_STROBE
}

fn is_default_speed(value: &f64) -> bool {
    is_same_speed(*value, DEFAULT_SPEED)
}

const fn is_default_strobe(value: &u32) -> bool {
    *value == DEFAULT_STROBE
}

/// Speeds that render to the same slow-motion key play identically.
pub(crate) fn is_same_speed(left: f64, right: f64) -> bool {
    slowmotion::format_speed(left) == slowmotion::format_speed(right)
}
