//! Iteration mode and the look-ahead window
//!
//! The window is where the cache tries to keep textures resident. Its shape
//! follows the anticipated direction of access:
//!
//! - `Forward`:  `[f, f + K]`, loaded ascending
//! - `Backward`: `[f - K, f]`, loaded descending
//! - `PingPong`: `[f - K/2, f + K/2]` (halves rounded up), loaded as a spiral
//!   `f, f+1, f-1, f+2, ...`
//!
//! Windows are clipped to the timeline range. Load order is nearest-first so
//! the frame about to be displayed is always queued before distant ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::core::time::FrameIndex;
use crate::entities::timeline::FrameRange;

/// Unrecognized textual mode or policy value
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
}

impl ParseModeError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Anticipated direction of future frame access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationMode {
    Forward,
    Backward,
    PingPong,
}

impl IterationMode {
    /// Forward when playing forward, backward when playing backward,
    /// both ways when paused.
    pub fn from_speed(speed: i32) -> Self {
        match speed.signum() {
            1 => IterationMode::Forward,
            -1 => IterationMode::Backward,
            _ => IterationMode::PingPong,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IterationMode::Forward => "forward",
            IterationMode::Backward => "backward",
            IterationMode::PingPong => "pingpong",
        }
    }
}

impl fmt::Display for IterationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IterationMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(IterationMode::Forward),
            "backward" => Ok(IterationMode::Backward),
            "pingpong" | "ping_pong" => Ok(IterationMode::PingPong),
            _ => Err(ParseModeError::new("iteration mode", s)),
        }
    }
}

/// What the cache does while playback is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PausedPrefetch {
    /// Prefetch both directions around the paused frame
    #[default]
    PingPong,
    /// Only keep the paused frame itself loaded
    CurrentFrame,
}

impl FromStr for PausedPrefetch {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pingpong" | "ping_pong" => Ok(PausedPrefetch::PingPong),
            "current" | "current_frame" => Ok(PausedPrefetch::CurrentFrame),
            _ => Err(ParseModeError::new("paused prefetch policy", s)),
        }
    }
}

/// Look-ahead window W(frame, mode, K), clipped to a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefetchWindow {
    pub center: FrameIndex,
    pub first: FrameIndex,
    pub last: FrameIndex,
    pub mode: IterationMode,
}

impl PrefetchWindow {
    pub fn new(frame: FrameIndex, mode: IterationMode, lookahead: u64, range: FrameRange) -> Self {
        let center = frame.clamp(range.first, range.last);
        let (behind, ahead) = match mode {
            IterationMode::Forward => (0, lookahead),
            IterationMode::Backward => (lookahead, 0),
            IterationMode::PingPong => {
                let half = lookahead.div_ceil(2);
                (half, half)
            }
        };
        Self {
            center,
            first: center.saturating_sub(behind).max(range.first),
            last: center.saturating_add(ahead).min(range.last),
            mode,
        }
    }

    pub fn contains(&self, frame: FrameIndex) -> bool {
        frame >= self.first && frame <= self.last
    }

    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Frames of the window, nearest to the center first.
    pub fn frames(&self) -> Vec<FrameIndex> {
        match self.mode {
            IterationMode::Forward => (self.center..=self.last).collect(),
            IterationMode::Backward => (self.first..=self.center).rev().collect(),
            IterationMode::PingPong => {
                let mut out = Vec::with_capacity(self.len() as usize);
                out.push(self.center);
                let reach = (self.last - self.center).max(self.center - self.first);
                for offset in 1..=reach {
                    if self.center + offset <= self.last {
                        out.push(self.center + offset);
                    }
                    if self.center >= self.first + offset {
                        out.push(self.center - offset);
                    }
                }
                out
            }
        }
    }
}
