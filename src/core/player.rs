//! Playback clock with frame-accurate cueing
//!
//! **Architecture**: Player owns its clock only. The timeline is shared
//! (`Arc<Timeline>`) with the texture cache; Player reads its range to clamp
//! cueing and never mutates it.
//!
//! # Timing Model
//!
//! Playback time is rational seconds ([`Time`]). Each tick the driving loop
//! calls [`Player::offset_playback_time`] with the real elapsed time; the clock
//! advances by `elapsed * speed`, so speed 2 plays twice as fast and -1 plays
//! backward. Speed 0 is paused: no drift, whatever the elapsed value.
//!
//! The current frame is derived from time by rounding half up, so frame `n`
//! owns `[(n - 1/2) d, (n + 1/2) d)` for frame duration `d`.
//!
//! # Boundaries
//!
//! - [`EndBehavior::Loop`]: time wraps around the timeline range
//! - [`EndBehavior::Stop`]: time clamps to the first/last frame and playback pauses
//!
//! Cueing always clamps: `cue(150)` on `[0, 100]` lands on 100.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info, trace};
use num_rational::Rational64;
use serde::{Deserialize, Serialize};

use super::time::{FrameDuration, FrameIndex, Time};
use super::window::ParseModeError;
use crate::entities::timeline::{FrameRange, Timeline};

/// Frame step size for Ctrl+Arrow
pub const FRAME_JUMP_STEP: i64 = 25;

/// What happens when playback runs past either end of the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBehavior {
    #[default]
    Loop,
    Stop,
}

impl fmt::Display for EndBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndBehavior::Loop => "loop",
            EndBehavior::Stop => "stop",
        })
    }
}

impl FromStr for EndBehavior {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loop" => Ok(EndBehavior::Loop),
            "stop" => Ok(EndBehavior::Stop),
            _ => Err(ParseModeError::new("end behavior", s)),
        }
    }
}

/// Playback state: position, speed and the timeline it is bound to
#[derive(Debug, Clone)]
pub struct Player {
    timeline: Arc<Timeline>,
    frame_duration: FrameDuration,
    time: Time,
    speed: i32,
    end_behavior: EndBehavior,
}

impl Player {
    /// Player bound to `timeline`, paused at its first frame.
    pub fn new(timeline: Arc<Timeline>, frame_duration: FrameDuration) -> Self {
        let mut player = Self {
            timeline: Arc::new(Timeline::new()),
            frame_duration,
            time: Time::ZERO,
            speed: 0,
            end_behavior: EndBehavior::default(),
        };
        player.load(timeline, frame_duration);
        player
    }

    /// Bind to a new timeline and frame duration; resets the clock to the start.
    ///
    /// Speed and end behavior are kept.
    pub fn load(&mut self, timeline: Arc<Timeline>, frame_duration: FrameDuration) {
        let range = timeline.range();
        self.timeline = timeline;
        self.frame_duration = frame_duration;
        self.time = frame_duration.time_of(range.first as i64);
        info!(
            "Player loaded: range [{}..{}], {}",
            range.first, range.last, frame_duration
        );
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    pub fn frame_duration(&self) -> FrameDuration {
        self.frame_duration
    }

    pub fn range(&self) -> FrameRange {
        self.timeline.range()
    }

    pub fn end_behavior(&self) -> EndBehavior {
        self.end_behavior
    }

    pub fn set_end_behavior(&mut self, behavior: EndBehavior) {
        self.end_behavior = behavior;
    }

    pub fn playback_speed(&self) -> i32 {
        self.speed
    }

    /// Set speed (frames per real second multiplier). 0 pauses.
    /// Does not move the playhead.
    pub fn set_playback_speed(&mut self, speed: i32) {
        if speed != self.speed {
            debug!("Playback speed {} -> {}", self.speed, speed);
        }
        self.speed = speed;
    }

    pub fn is_playing(&self) -> bool {
        self.speed != 0
    }

    /// Space: pause when playing, play forward at 1x when paused.
    pub fn toggle_play(&mut self) {
        let speed = if self.is_playing() { 0 } else { 1 };
        self.set_playback_speed(speed);
    }

    pub fn playback_time(&self) -> Time {
        self.time
    }

    pub fn current_frame(&self) -> FrameIndex {
        self.range().clamp(self.frame_duration.frame_at(self.time))
    }

    /// Advance the clock by `elapsed` real time scaled by the playback speed.
    pub fn offset_playback_time(&mut self, elapsed: Time) {
        if self.speed == 0 || elapsed.is_zero() {
            return;
        }
        self.time += elapsed * i64::from(self.speed);

        let range = self.range();
        let d = self.frame_duration.time().ratio();
        let half = Rational64::new(1, 2);
        // Frame n owns [(n - 1/2) d, (n + 1/2) d)
        let low = (Rational64::from_integer(range.first as i64) - half) * d;
        let high = (Rational64::from_integer(range.last as i64) + half) * d;
        let t = self.time.ratio();
        if t >= low && t < high {
            return;
        }

        match self.end_behavior {
            EndBehavior::Loop => {
                let span = high - low;
                let rel = t - low;
                let wrapped = rel - span * (rel / span).floor();
                self.time = Time::from_ratio(low + wrapped);
                trace!("Looped to frame {}", self.current_frame());
            }
            EndBehavior::Stop => {
                let edge = if t < low { range.first } else { range.last };
                self.time = self.frame_duration.time_of(edge as i64);
                self.speed = 0;
                debug!("Reached frame {}, playback stopped", edge);
            }
        }
    }

    /// Absolute seek, clamped to the timeline range.
    pub fn cue(&mut self, frame: i64) {
        let target = self.range().clamp(frame);
        self.time = self.frame_duration.time_of(target as i64);
        trace!("Cue {} -> {}", frame, target);
    }

    /// Seek by `delta` frames from the current frame.
    pub fn cue_relative(&mut self, delta: i64) {
        let current = self.current_frame() as i64;
        self.cue(current.saturating_add(delta));
    }

    /// Home
    pub fn cue_first(&mut self) {
        self.cue(self.range().first as i64);
    }

    /// End
    pub fn cue_last(&mut self) {
        self.cue(self.range().last as i64);
    }
}
