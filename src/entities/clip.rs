//! Clip: a bounded frame range on a track, mapped onto one media stream
//!
//! A clip placed at `start` covers `[start, start + length)`. Timeline frame
//! `f` maps to local stream frame `offset + floor((f - start) * rate)`, so a
//! rate of 1/2 holds every source frame twice and a rate of 2 skips every
//! other one.

use std::fmt;
use std::sync::Arc;

use num_rational::Rational64;
use serde::{Deserialize, Serialize};

use super::media::{MediaStream, StreamId};
use super::timeline::TimelineError;
use super::view::ViewState;

/// Cache key: one frame of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaFrameReference {
    pub stream: StreamId,
    pub frame: u64,
}

impl MediaFrameReference {
    pub fn new(stream: StreamId, frame: u64) -> Self {
        Self { stream, frame }
    }
}

impl fmt::Display for MediaFrameReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stream, self.frame)
    }
}

/// Something drawn on top of a clip (burn-ins, slates). Rendered externally.
pub trait Overlay: Send + Sync + fmt::Debug {
    fn render(&self, view: &ViewState);
}

#[derive(Debug, Clone)]
pub struct Clip {
    length: u64,
    stream: Option<Arc<dyn MediaStream>>,
    overlay: Option<Arc<dyn Overlay>>,
    offset: u64,
    rate: Rational64,
}

impl Clip {
    /// Clip playing `stream` from its first frame at rate 1.
    pub fn new(stream: Arc<dyn MediaStream>, length: u64) -> Self {
        Self {
            length,
            stream: Some(stream),
            overlay: None,
            offset: 0,
            rate: Rational64::from_integer(1),
        }
    }

    /// Clip with an overlay and no media (title cards, slates).
    pub fn overlay_only(overlay: Arc<dyn Overlay>, length: u64) -> Self {
        Self {
            length,
            stream: None,
            overlay: Some(overlay),
            offset: 0,
            rate: Rational64::from_integer(1),
        }
    }

    /// Clip covering the whole stream.
    pub fn whole(stream: Arc<dyn MediaStream>) -> Self {
        let length = stream.frame_count();
        Self::new(stream, length)
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_rate(mut self, rate: Rational64) -> Result<Self, TimelineError> {
        if rate <= Rational64::from_integer(0) {
            return Err(TimelineError::InvalidRate(rate));
        }
        self.rate = rate;
        Ok(self)
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn Overlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn stream(&self) -> Option<&Arc<dyn MediaStream>> {
        self.stream.as_ref()
    }

    pub fn overlay(&self) -> Option<&Arc<dyn Overlay>> {
        self.overlay.as_ref()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn rate(&self) -> Rational64 {
        self.rate
    }

    /// Local stream frame for the `index`-th frame of the clip.
    pub fn local_frame(&self, index: u64) -> u64 {
        let scaled = (Rational64::from_integer(index as i64) * self.rate).floor().to_integer();
        self.offset + scaled.max(0) as u64
    }

    /// Reference for the `index`-th frame of the clip, if it has media.
    pub fn reference_at(&self, index: u64) -> Option<MediaFrameReference> {
        if index >= self.length {
            return None;
        }
        let stream = self.stream.as_ref()?;
        Some(MediaFrameReference::new(stream.id(), self.local_frame(index)))
    }

    /// Whether some frame of this clip shows `local` of its stream.
    pub fn reaches(&self, local: u64) -> bool {
        if local < self.offset || self.length == 0 {
            return false;
        }
        let d = Rational64::from_integer((local - self.offset) as i64);
        // Smallest clip index whose mapped position is at least `d`
        let index = (d / self.rate).ceil().to_integer();
        if index < 0 || index as u64 >= self.length {
            return false;
        }
        self.local_frame(index as u64) == local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::media::SyntheticStream;

    fn stream() -> Arc<dyn MediaStream> {
        Arc::new(SyntheticStream::new("s", 1000))
    }

    #[test]
    fn test_local_mapping_with_offset() {
        let clip = Clip::new(stream(), 10).with_offset(100);
        assert_eq!(clip.local_frame(0), 100);
        assert_eq!(clip.local_frame(9), 109);
        assert!(clip.reference_at(10).is_none());
        assert!(clip.reaches(105));
        assert!(!clip.reaches(99));
        assert!(!clip.reaches(110));
    }

    #[test]
    fn test_half_rate_holds_frames() {
        let clip = Clip::new(stream(), 6).with_rate(Rational64::new(1, 2)).unwrap();
        let locals: Vec<u64> = (0..6).map(|i| clip.local_frame(i)).collect();
        assert_eq!(locals, vec![0, 0, 1, 1, 2, 2]);
        assert!(clip.reaches(2));
        assert!(!clip.reaches(3));
    }

    #[test]
    fn test_double_rate_skips_frames() {
        let clip = Clip::new(stream(), 4).with_rate(Rational64::from_integer(2)).unwrap();
        let locals: Vec<u64> = (0..4).map(|i| clip.local_frame(i)).collect();
        assert_eq!(locals, vec![0, 2, 4, 6]);
        assert!(clip.reaches(4));
        assert!(!clip.reaches(5));
        assert!(!clip.reaches(8));
    }

    #[test]
    fn test_invalid_rate() {
        assert!(Clip::new(stream(), 4).with_rate(Rational64::from_integer(0)).is_err());
        assert!(Clip::new(stream(), 4).with_rate(Rational64::new(-1, 2)).is_err());
    }
}
