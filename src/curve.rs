//! Time-indexed keyframe containers.
//!
//! A [`Curve`] is an ordered map from [`TimePoint`] to a value, queried in
//! one of three flavours:
//!
//! - **step** – value of the last keyframe at or before the query time
//! - **linear** – as step, interpolated toward the next keyframe
//! - **pulse** – discrete events; queries return the last event and ranges
//!   of events can be extracted for "did it fire this tick" checks

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::UniqueId;
use crate::input::Action;
use crate::time::TimePoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveKind {
    Step,
    Linear,
    Pulse,
}

#[derive(Debug, Error)]
pub enum CurveError {
    /// A keyframe append earlier than the newest stored keyframe.
    #[error("keyframe at {0:?} is earlier than the newest keyframe")]
    Ordering(TimePoint),
}

/// A single keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub time: TimePoint,
    pub value: T,
}

/// Value stored in a curve.
///
/// `lerp` defaults to step behaviour; arithmetic types override it and set
/// `LERPABLE` so declarations can reject linear curves over types that
/// cannot interpolate.
pub trait CurveValue: Clone {
    const LERPABLE: bool = false;

    fn lerp(a: &Self, b: &Self, _alpha: f32) -> Self {
        let _ = b;
        a.clone()
    }
}

/// Two-component float vector, the engine's positional value type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

impl Vec2f {
    pub const fn new(x: f32, y: f32) -> Self {
        Vec2f { x, y }
    }
}

impl CurveValue for i32 {
    const LERPABLE: bool = true;
    fn lerp(a: &Self, b: &Self, alpha: f32) -> Self {
        (*a as f64 + (*b as f64 - *a as f64) * alpha as f64).round() as i32
    }
}

impl CurveValue for f32 {
    const LERPABLE: bool = true;
    fn lerp(a: &Self, b: &Self, alpha: f32) -> Self {
        a + (b - a) * alpha
    }
}

impl CurveValue for Vec2f {
    const LERPABLE: bool = true;
    fn lerp(a: &Self, b: &Self, alpha: f32) -> Self {
        Vec2f {
            x: f32::lerp(&a.x, &b.x, alpha),
            y: f32::lerp(&a.y, &b.y, alpha),
        }
    }
}

impl CurveValue for bool {}
impl CurveValue for String {}
impl CurveValue for UniqueId {}
impl CurveValue for char {}
impl CurveValue for Action {}

impl<T: CurveValue> CurveValue for Vec<T> {
    const LERPABLE: bool = T::LERPABLE;

    /// Componentwise over the common prefix; the tail of the longer side is
    /// taken from `b`.
    fn lerp(a: &Self, b: &Self, alpha: f32) -> Self {
        let mut out: Vec<T> = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| T::lerp(x, y, alpha))
            .collect();
        if b.len() > a.len() {
            out.extend_from_slice(&b[a.len()..]);
        }
        out
    }
}

/// Ordered keyframe container. Keyframes are strictly ordered by time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curve<T> {
    kind: CurveKind,
    frames: Vec<Keyframe<T>>,
    default: T,
}

impl<T: Default> Curve<T> {
    pub fn new(kind: CurveKind) -> Self {
        Curve {
            kind,
            frames: Vec::new(),
            default: T::default(),
        }
    }
}

impl<T> Curve<T> {
    pub fn with_default(kind: CurveKind, default: T) -> Self {
        Curve {
            kind,
            frames: Vec::new(),
            default,
        }
    }

    pub fn kind(&self) -> CurveKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyframe<T>> {
        self.frames.iter()
    }

    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.frames
    }

    /// Place a keyframe, overwriting any keyframe at exactly `t`.
    pub fn set(&mut self, t: TimePoint, value: T) {
        match self.frames.binary_search_by_key(&t, |f| f.time) {
            Ok(i) => self.frames[i].value = value,
            Err(i) => self.frames.insert(i, Keyframe { time: t, value }),
        }
    }

    /// Alias of [`Curve::set`].
    pub fn insert(&mut self, t: TimePoint, value: T) {
        self.set(t, value);
    }

    /// Place a keyframe that must not be earlier than the newest one.
    pub fn append(&mut self, t: TimePoint, value: T) -> Result<(), CurveError> {
        if let Some(last) = self.frames.last_mut() {
            if t < last.time {
                return Err(CurveError::Ordering(t));
            }
            if t == last.time {
                last.value = value;
                return Ok(());
            }
        }
        self.frames.push(Keyframe { time: t, value });
        Ok(())
    }

    /// Remove every keyframe with time ≥ `t`, then insert `(t, value)`.
    pub fn replace_keyframes(&mut self, t: TimePoint, value: T) {
        let keep = self.frames.partition_point(|f| f.time < t);
        self.frames.truncate(keep);
        self.frames.push(Keyframe { time: t, value });
    }

    /// Index of the last keyframe at or before `t`.
    fn floor_index(&self, t: TimePoint) -> Option<usize> {
        let n = self.frames.partition_point(|f| f.time <= t);
        n.checked_sub(1)
    }

    /// The last keyframe at or before `t`; the query flavour for pulse
    /// curves.
    pub fn last_event(&self, t: TimePoint) -> Option<&Keyframe<T>> {
        self.floor_index(t).map(|i| &self.frames[i])
    }

    /// Events in the half-open interval `(after, until]`.
    pub fn events_between(&self, after: TimePoint, until: TimePoint) -> &[Keyframe<T>] {
        let lo = self.frames.partition_point(|f| f.time <= after);
        let hi = self.frames.partition_point(|f| f.time <= until);
        &self.frames[lo..hi]
    }
}

impl<T: CurveValue> Curve<T> {
    /// Query the curve at `t`. Total; an empty curve yields the default.
    pub fn get(&self, t: TimePoint) -> T {
        match self.kind {
            CurveKind::Step | CurveKind::Pulse => match self.floor_index(t) {
                Some(i) => self.frames[i].value.clone(),
                None => self.default.clone(),
            },
            CurveKind::Linear => self.get_linear(t),
        }
    }

    fn get_linear(&self, t: TimePoint) -> T {
        if self.frames.is_empty() {
            return self.default.clone();
        }
        match self.floor_index(t) {
            // before the first keyframe: closest endpoint
            None => self.frames[0].value.clone(),
            Some(i) if i + 1 == self.frames.len() => self.frames[i].value.clone(),
            Some(i) => {
                let a = &self.frames[i];
                let b = &self.frames[i + 1];
                let span = (b.time - a.time).as_nanos();
                let offset = (t - a.time).as_nanos();
                let alpha = if span == 0 {
                    1.0
                } else {
                    (offset as f64 / span as f64) as f32
                };
                T::lerp(&a.value, &b.value, alpha)
            }
        }
    }
}

impl<T: Default> Default for Curve<T> {
    fn default() -> Self {
        Curve::new(CurveKind::Step)
    }
}
