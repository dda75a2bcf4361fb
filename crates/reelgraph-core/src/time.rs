use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};

use crate::error::EditError;

/// A frame count on the timeline. Every public edit takes and returns this,
/// never wall-clock milliseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FramePos(pub i64);

impl FramePos {
    pub const ZERO: Self = Self(0);
    /// Largest magnitude an edit or a loaded document may use; roughly 1400
    /// years at 25 fps. Sums of bounded values stay far from `i64` overflow.
    pub const LIMIT: Self = Self(1 << 40);

    /// Rejects values outside `-LIMIT..=LIMIT`.
    pub fn bounded(self) -> Result<Self, EditError> {
        if self.0.unsigned_abs() > Self::LIMIT.0.unsigned_abs() {
            return Err(EditError::invalid_range(format!(
                "frame value {self} exceeds the timeline limit {}",
                Self::LIMIT
            )));
        }
        Ok(self)
    }

    #[must_use]
    pub const fn frames(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }
}

impl fmt::Display for FramePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for FramePos {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Add for FramePos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for FramePos {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for FramePos {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for FramePos {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for FramePos {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for FramePos {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Half-open span `[start, end)`. Two ranges where one ends exactly where the
/// other starts are adjacent, not overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: FramePos,
    pub end: FramePos,
}

impl FrameRange {
    #[must_use]
    pub const fn new(start: FramePos, end: FramePos) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn from_frames(start: i64, end: i64) -> Self {
        Self::new(FramePos(start), FramePos(end))
    }

    #[must_use]
    pub fn with_length(start: FramePos, length: FramePos) -> Self {
        Self::new(start, start + length)
    }

    #[must_use]
    pub fn len(&self) -> FramePos {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[must_use]
    pub fn contains(&self, position: FramePos) -> bool {
        self.start <= position && position < self.end
    }

    #[must_use]
    pub fn contains_range(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let range = Self::new(self.start.max(other.start), self.end.min(other.end));
        (!range.is_empty()).then_some(range)
    }

    #[must_use]
    pub fn shifted(&self, delta: FramePos) -> Self {
        Self::new(self.start + delta, self.end + delta)
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Rational frame rate, e.g. `30000/1001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

impl Default for Fps {
    fn default() -> Self {
        Self::PAL
    }
}

impl Fps {
    pub const PAL: Self = Self { num: 25, den: 1 };
    pub const NTSC: Self = Self {
        num: 30_000,
        den: 1_001,
    };

    pub fn new(num: u32, den: u32) -> Result<Self, EditError> {
        if num == 0 || den == 0 {
            return Err(EditError::InvalidFps { num, den });
        }
        Ok(Self { num, den })
    }

    pub fn validate(self) -> Result<Self, EditError> {
        Self::new(self.num, self.den)
    }

    /// Parses `"25"` or `"30000/1001"`.
    pub fn parse(text: &str) -> Result<Self, EditError> {
        let invalid = || EditError::InvalidFps { num: 0, den: 0 };
        let (num, den) = match text.split_once('/') {
            Some((num, den)) => (num.trim(), den.trim()),
            None => (text.trim(), "1"),
        };
        let num = num.parse::<u32>().map_err(|_| invalid())?;
        let den = den.parse::<u32>().map_err(|_| invalid())?;
        Self::new(num, den)
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    #[must_use]
    pub fn frames_to_seconds(self, frames: FramePos) -> f64 {
        frames.0 as f64 * f64::from(self.den) / f64::from(self.num)
    }

    #[must_use]
    pub fn seconds_to_frames(self, seconds: f64) -> FramePos {
        FramePos((seconds * f64::from(self.num) / f64::from(self.den)).round() as i64)
    }

    /// Nominal integer frames per second used for timecode display.
    #[must_use]
    pub fn nominal(self) -> i64 {
        i64::from(self.num.div_ceil(self.den))
    }

    /// Non-drop-frame `HH:MM:SS:FF`.
    #[must_use]
    pub fn timecode(self, position: FramePos) -> String {
        let sign = if position.0 < 0 { "-" } else { "" };
        let frames = position.0.abs();
        let per_second = self.nominal().max(1);
        let ff = frames % per_second;
        let total_seconds = frames / per_second;
        let ss = total_seconds % 60;
        let mm = (total_seconds / 60) % 60;
        let hh = total_seconds / 3_600;
        format!("{sign}{hh:02}:{mm:02}:{ss:02}:{ff:02}")
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescaleReport {
    pub values: usize,
    pub inexact: usize,
}

/// Re-quantizes stored frame values from one frame rate to another.
///
/// Positions round to the nearest frame. Durations are derived from rescaled
/// boundaries by the caller; [`Rescaler::duration`] refuses to collapse a
/// non-zero span to zero frames.
#[derive(Debug, Clone)]
pub struct Rescaler {
    numerator: i128,
    denominator: i128,
    report: RescaleReport,
}

impl Rescaler {
    pub fn new(from: Fps, to: Fps) -> Result<Self, EditError> {
        let from = from.validate()?;
        let to = to.validate()?;
        Ok(Self {
            numerator: i128::from(to.num) * i128::from(from.den),
            denominator: i128::from(to.den) * i128::from(from.num),
            report: RescaleReport::default(),
        })
    }

    pub fn position(&mut self, position: FramePos) -> Result<FramePos, EditError> {
        let scaled = i128::from(position.0) * self.numerator;
        let quotient = div_round(scaled, self.denominator);
        self.report.values += 1;
        if scaled % self.denominator != 0 {
            self.report.inexact += 1;
        }
        i64::try_from(quotient)
            .map(FramePos)
            .map_err(|_| EditError::invalid_range(format!("frame {position} overflows")))?
            .bounded()
    }

    pub fn span(&mut self, range: FrameRange) -> Result<FrameRange, EditError> {
        let start = self.position(range.start)?;
        let end = self.position(range.end)?;
        if !range.is_empty() && end <= start {
            return Err(EditError::invalid_range(format!(
                "span {range} collapses to zero frames"
            )));
        }
        Ok(FrameRange::new(start, end))
    }

    pub fn duration(&mut self, length: FramePos) -> Result<FramePos, EditError> {
        let scaled = self.position(length)?;
        if length.is_positive() && !scaled.is_positive() {
            return Err(EditError::invalid_range(format!(
                "duration {length} collapses to zero frames"
            )));
        }
        Ok(scaled)
    }

    #[must_use]
    pub fn finish(self) -> RescaleReport {
        self.report
    }
}

fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}
