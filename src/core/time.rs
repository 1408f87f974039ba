//! Rational playback time
//!
//! Time is a rational number of seconds. Real elapsed time is folded in as
//! microseconds and frame positions as multiples of a [`FrameDuration`], so
//! `cue(n)` followed by a read of the frame index is exact for any frame rate
//! (including 24000/1001).
//!
//! Frame index = `floor(time / frame_duration + 1/2)`, i.e. rounding half up.
//! Half up (rather than half away from zero) keeps the window of frame 0
//! symmetric: `[-d/2, d/2)` maps to frame 0.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use std::time::Duration;
use thiserror::Error;

/// Frame index on the timeline.
pub type FrameIndex = u64;

/// Errors building time values from configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("frame rate must be positive, got {num}/{den}")]
    InvalidRate { num: i64, den: i64 },
    #[error("frame duration must be positive")]
    NonPositiveDuration,
}

/// A point in (or span of) playback time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time {
    value: Rational64,
}

impl Time {
    pub const ZERO: Self = Self {
        value: Rational64::new_raw(0, 1),
    };

    /// `count / scale` seconds.
    ///
    /// # Panics
    /// If `scale` is not strictly positive.
    pub fn new(count: i64, scale: i64) -> Self {
        assert!(scale > 0, "time scale must be positive, got {scale}");
        Self {
            value: Rational64::new(count, scale),
        }
    }

    pub fn from_micros(micros: i64) -> Self {
        Self::new(micros, 1_000_000)
    }

    /// Wall-clock duration, truncated to microseconds.
    pub fn from_duration(duration: Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Self::from_micros(micros)
    }

    pub fn from_ratio(value: Rational64) -> Self {
        Self { value }
    }

    pub fn ratio(self) -> Rational64 {
        self.value
    }

    pub fn count(self) -> i64 {
        *self.value.numer()
    }

    pub fn scale(self) -> i64 {
        *self.value.denom()
    }

    pub fn as_seconds_f64(self) -> f64 {
        self.count() as f64 / self.scale() as f64
    }

    pub fn is_zero(self) -> bool {
        self.count() == 0
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for Time {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
        }
    }
}

impl AddAssign for Time {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
    }
}

impl Sub for Time {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
        }
    }
}

impl Neg for Time {
    type Output = Self;
    fn neg(self) -> Self {
        Self { value: -self.value }
    }
}

impl Mul<i64> for Time {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self {
            value: self.value * rhs,
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_seconds_f64())
    }
}

/// Fixed time-per-frame for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDuration(Time);

impl FrameDuration {
    /// Duration of one frame at `num/den` frames per second (e.g. 24000/1001).
    pub fn from_fps(num: i64, den: i64) -> Result<Self, TimeError> {
        if num <= 0 || den <= 0 {
            return Err(TimeError::InvalidRate { num, den });
        }
        Ok(Self(Time::new(den, num)))
    }

    pub fn new(time: Time) -> Result<Self, TimeError> {
        if time.count() <= 0 {
            return Err(TimeError::NonPositiveDuration);
        }
        Ok(Self(time))
    }

    pub fn time(self) -> Time {
        self.0
    }

    /// Start time of `frame`.
    pub fn time_of(self, frame: i64) -> Time {
        self.0 * frame
    }

    /// Fractional frame position of `time`.
    pub fn frames_in(self, time: Time) -> Rational64 {
        time.ratio() / self.0.ratio()
    }

    /// Frame index at `time`, rounding half up. May be negative.
    pub fn frame_at(self, time: Time) -> i64 {
        (self.frames_in(time) + Rational64::new(1, 2)).floor().to_integer()
    }

    /// Frames per second as a float, for display.
    pub fn fps(self) -> f64 {
        1.0 / self.0.as_seconds_f64()
    }
}

impl Default for FrameDuration {
    fn default() -> Self {
        Self(Time::new(1, 24))
    }
}

impl fmt::Display for FrameDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} fps", self.fps())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntsc_round_trip() {
        let d = FrameDuration::from_fps(24000, 1001).unwrap();
        for frame in [0i64, 1, 23, 24, 1000, 86_399] {
            assert_eq!(d.frame_at(d.time_of(frame)), frame);
        }
    }

    #[test]
    fn test_rounding_half_up() {
        let d = FrameDuration::from_fps(25, 1).unwrap();
        // 20ms into a 40ms frame rounds up to the next one
        assert_eq!(d.frame_at(Time::from_micros(20_000)), 1);
        assert_eq!(d.frame_at(Time::from_micros(19_999)), 0);
        // Half a frame before zero still reads as frame 0
        assert_eq!(d.frame_at(Time::from_micros(-20_000)), 0);
        assert_eq!(d.frame_at(Time::from_micros(-20_001)), -1);
    }

    #[test]
    fn test_invalid_rates_rejected() {
        assert_eq!(
            FrameDuration::from_fps(0, 1),
            Err(TimeError::InvalidRate { num: 0, den: 1 })
        );
        assert!(FrameDuration::from_fps(24, -1).is_err());
        assert_eq!(FrameDuration::new(Time::ZERO), Err(TimeError::NonPositiveDuration));
    }

    #[test]
    fn test_duration_conversion() {
        let t = Time::from_duration(Duration::from_millis(1500));
        assert_eq!(t, Time::new(3, 2));
        assert_eq!(t.to_string(), "1.500s");
    }
}
