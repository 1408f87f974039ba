//! Per-session view parameters handed to renderers by reference.
//!
//! One owned [`ViewState`] lives in the session; input handling mutates it
//! between ticks and renderers read it during a tick. Nothing else holds it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::window::ParseModeError;

/// How the image is fitted into the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Zoom and pan are left to the user
    Free,
    /// Whole image visible
    #[default]
    Inner,
    /// Viewport fully covered
    Outer,
    /// One image pixel per screen pixel
    Actual,
}

impl FitMode {
    /// Next mode in the `f` key cycle. `Free` is only reachable by scrolling.
    pub fn next(self) -> Self {
        match self {
            FitMode::Free => FitMode::Inner,
            FitMode::Inner => FitMode::Outer,
            FitMode::Outer => FitMode::Actual,
            FitMode::Actual => FitMode::Inner,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FitMode::Free => "No fit",
            FitMode::Inner => "Fit inner frame",
            FitMode::Outer => "Fit outer frame",
            FitMode::Actual => "Actual pixel",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FitMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(FitMode::Free),
            "inner" => Ok(FitMode::Inner),
            "outer" => Ok(FitMode::Outer),
            "actual" => Ok(FitMode::Actual),
            _ => Err(ParseModeError::new("fit mode", s)),
        }
    }
}

/// Color channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

/// Displayed channels. All-false means "show everything".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ChannelMask {
    pub const ALL: Self = Self {
        r: false,
        g: false,
        b: false,
        a: false,
    };

    pub fn only(channel: Channel) -> Self {
        let mut mask = Self::ALL;
        match channel {
            Channel::Red => mask.r = true,
            Channel::Green => mask.g = true,
            Channel::Blue => mask.b = true,
            Channel::Alpha => mask.a = true,
        }
        mask
    }

    /// Solo `channel`, or back to all channels if it was already soloed.
    pub fn toggle_solo(self, channel: Channel) -> Self {
        let solo = Self::only(channel);
        if self == solo { Self::ALL } else { solo }
    }

    pub fn is_all(self) -> bool {
        self == Self::ALL
    }
}

const EXPOSURE_STEP: f32 = 1.2;

/// Zoom, pan, exposure, channels and viewport of the display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub viewport: (u32, u32),
    pub zoom: f32,
    pub pan: (i32, i32),
    pub exposure: f32,
    pub channels: ChannelMask,
    pub fit_mode: FitMode,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            viewport: (1280, 720),
            zoom: 1.0,
            pan: (0, 0),
            exposure: 1.0,
            channels: ChannelMask::ALL,
            fit_mode: FitMode::default(),
        }
    }
}

impl ViewState {
    /// Scroll zoom, logarithmic so each notch is a constant ratio.
    /// Leaves fitting mode: the user now owns the zoom.
    pub fn scroll(&mut self, amount: f32) {
        self.zoom = (self.zoom.ln() + amount / 8.0).exp();
        self.fit_mode = FitMode::Free;
    }

    /// Mouse drag in window coordinates (y down).
    pub fn drag(&mut self, dx: i32, dy: i32) {
        self.pan.0 += dx;
        self.pan.1 -= dy;
    }

    pub fn exposure_up(&mut self) {
        self.exposure *= EXPOSURE_STEP;
    }

    pub fn exposure_down(&mut self) {
        self.exposure /= EXPOSURE_STEP;
    }

    pub fn reset_exposure(&mut self) {
        self.exposure = 1.0;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    /// Zoom that fits an image of the given size under the current fit mode.
    pub fn fit_zoom(&self, width: u32, height: u32) -> f32 {
        if width == 0 || height == 0 {
            return self.zoom;
        }
        let sx = self.viewport.0 as f32 / width as f32;
        let sy = self.viewport.1 as f32 / height as f32;
        match self.fit_mode {
            FitMode::Free => self.zoom,
            FitMode::Inner => sx.min(sy),
            FitMode::Outer => sx.max(sy),
            FitMode::Actual => 1.0,
        }
    }

    /// Apply the fit for an image, resetting pan. No-op in free mode.
    pub fn apply_fit(&mut self, width: u32, height: u32) {
        if self.fit_mode == FitMode::Free {
            return;
        }
        self.zoom = self.fit_zoom(width, height);
        self.pan = (0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_cycle() {
        assert_eq!(FitMode::Free.next(), FitMode::Inner);
        assert_eq!(FitMode::Inner.next(), FitMode::Outer);
        assert_eq!(FitMode::Outer.next(), FitMode::Actual);
        assert_eq!(FitMode::Actual.next(), FitMode::Inner);
        assert!("sideways".parse::<FitMode>().is_err());
        assert_eq!("OUTER".parse::<FitMode>().unwrap(), FitMode::Outer);
    }

    #[test]
    fn test_channel_solo_toggle() {
        let mask = ChannelMask::ALL.toggle_solo(Channel::Red);
        assert_eq!(mask, ChannelMask::only(Channel::Red));
        assert!(mask.toggle_solo(Channel::Red).is_all());
        assert_eq!(mask.toggle_solo(Channel::Alpha), ChannelMask::only(Channel::Alpha));
    }

    #[test]
    fn test_fit_zoom() {
        let mut view = ViewState {
            viewport: (1000, 500),
            ..ViewState::default()
        };
        assert_eq!(view.fit_zoom(2000, 500), 0.5);
        view.fit_mode = FitMode::Outer;
        assert_eq!(view.fit_zoom(2000, 500), 1.0);
        view.pan = (10, 10);
        view.fit_mode = FitMode::Actual;
        view.apply_fit(2000, 500);
        assert_eq!((view.zoom, view.pan), (1.0, (0, 0)));
    }

    #[test]
    fn test_scroll_and_exposure() {
        let mut view = ViewState::default();
        view.scroll(8.0);
        assert!((view.zoom - std::f32::consts::E).abs() < 1e-4);
        assert_eq!(view.fit_mode, FitMode::Free);

        view.exposure_up();
        view.exposure_down();
        assert!((view.exposure - 1.0).abs() < 1e-6);
        view.exposure_up();
        view.reset_exposure();
        assert_eq!(view.exposure, 1.0);
    }
}
