//! Simulation time types.
//!
//! Time is counted in signed nanoseconds so that keyframe subtraction is
//! safe on either side of the epoch. [`TimePoint`] is an instant on the
//! per-instance game clock, [`TimeDuration`] a signed span.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signed span of game time, in nanoseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeDuration(i64);

/// Instant on the game clock, in nanoseconds since the instance epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimePoint(i64);

impl TimeDuration {
    pub const ZERO: TimeDuration = TimeDuration(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        TimeDuration(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        TimeDuration(micros * 1_000)
    }

    pub const fn from_millis(millis: i64) -> Self {
        TimeDuration(millis * 1_000_000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        TimeDuration(secs * 1_000_000_000)
    }

    pub fn from_secs_f32(secs: f32) -> Self {
        TimeDuration((secs as f64 * 1e9) as i64)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub const fn as_millis(self) -> i64 {
        self.0 / 1_000_000
    }

    pub fn as_secs_f32(self) -> f32 {
        self.0 as f32 / 1e9
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }
}

impl TimePoint {
    /// The instance epoch.
    pub const ZERO: TimePoint = TimePoint(0);
    /// The far future; useful as an "export nothing" cursor.
    pub const MAX: TimePoint = TimePoint(i64::MAX);

    pub const fn from_nanos(nanos: i64) -> Self {
        TimePoint(nanos)
    }

    pub const fn from_millis(millis: i64) -> Self {
        TimePoint(millis * 1_000_000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        TimePoint(secs * 1_000_000_000)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Span since the epoch.
    pub const fn since_epoch(self) -> TimeDuration {
        TimeDuration(self.0)
    }
}

impl Add<TimeDuration> for TimePoint {
    type Output = TimePoint;
    fn add(self, rhs: TimeDuration) -> TimePoint {
        TimePoint(self.0 + rhs.0)
    }
}

impl AddAssign<TimeDuration> for TimePoint {
    fn add_assign(&mut self, rhs: TimeDuration) {
        self.0 += rhs.0;
    }
}

impl Sub<TimeDuration> for TimePoint {
    type Output = TimePoint;
    fn sub(self, rhs: TimeDuration) -> TimePoint {
        TimePoint(self.0 - rhs.0)
    }
}

impl SubAssign<TimeDuration> for TimePoint {
    fn sub_assign(&mut self, rhs: TimeDuration) {
        self.0 -= rhs.0;
    }
}

impl Sub for TimePoint {
    type Output = TimeDuration;
    fn sub(self, rhs: TimePoint) -> TimeDuration {
        TimeDuration(self.0 - rhs.0)
    }
}

impl Add for TimeDuration {
    type Output = TimeDuration;
    fn add(self, rhs: TimeDuration) -> TimeDuration {
        TimeDuration(self.0 + rhs.0)
    }
}

impl AddAssign for TimeDuration {
    fn add_assign(&mut self, rhs: TimeDuration) {
        self.0 += rhs.0;
    }
}

impl Sub for TimeDuration {
    type Output = TimeDuration;
    fn sub(self, rhs: TimeDuration) -> TimeDuration {
        TimeDuration(self.0 - rhs.0)
    }
}

impl SubAssign for TimeDuration {
    fn sub_assign(&mut self, rhs: TimeDuration) {
        self.0 -= rhs.0;
    }
}

impl Neg for TimeDuration {
    type Output = TimeDuration;
    fn neg(self) -> TimeDuration {
        TimeDuration(-self.0)
    }
}

impl Mul<i64> for TimeDuration {
    type Output = TimeDuration;
    fn mul(self, rhs: i64) -> TimeDuration {
        TimeDuration(self.0 * rhs)
    }
}

impl Div<i64> for TimeDuration {
    type Output = TimeDuration;
    fn div(self, rhs: i64) -> TimeDuration {
        TimeDuration(self.0 / rhs)
    }
}

impl fmt::Display for TimeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1_000_000 == 0 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot parse duration from {0:?}")]
pub struct DurationParseError(pub String);

/// Parse a duration string: `"500ms"`, `"2s"`, `"100us"`, `"3ns"`.
///
/// A bare number is read as milliseconds. Seconds accept a fractional part.
pub fn duration_from_string(s: &str) -> Result<TimeDuration, DurationParseError> {
    let s = s.trim();
    let err = || DurationParseError(s.to_owned());

    if let Some(num) = s.strip_suffix("ms") {
        let millis: i64 = num.trim().parse().map_err(|_| err())?;
        Ok(TimeDuration::from_millis(millis))
    } else if let Some(num) = s.strip_suffix("us") {
        let micros: i64 = num.trim().parse().map_err(|_| err())?;
        Ok(TimeDuration::from_micros(micros))
    } else if let Some(num) = s.strip_suffix("ns") {
        let nanos: i64 = num.trim().parse().map_err(|_| err())?;
        Ok(TimeDuration::from_nanos(nanos))
    } else if let Some(num) = s.strip_suffix('s') {
        let secs: f64 = num.trim().parse().map_err(|_| err())?;
        Ok(TimeDuration::from_nanos((secs * 1e9) as i64))
    } else {
        let millis: i64 = s.parse().map_err(|_| err())?;
        Ok(TimeDuration::from_millis(millis))
    }
}

/// Fractional position of `t` within a repeating `period`, in `[0, 1)`.
///
/// A zero or negative period yields `0.0`.
pub fn normalise_time(t: TimePoint, period: TimeDuration) -> f32 {
    if period.as_nanos() <= 0 {
        return 0.0;
    }
    let rem = t.as_nanos().rem_euclid(period.as_nanos());
    rem as f32 / period.as_nanos() as f32
}
