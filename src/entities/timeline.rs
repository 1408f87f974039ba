//! Timeline: ordered tracks of time-sorted clips
//!
//! Tracks key clips by start frame in a `BTreeMap`, so "which clip covers
//! frame f" is one ordered range lookup. Gaps are normal and answer `None`.
//!
//! Frame ranges are inclusive `(first, last)`. An empty timeline reports
//! `(0, 0)` so a player bound to it still has a valid position.

use std::collections::BTreeMap;
use std::ops::Bound;

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clip::{Clip, MediaFrameReference};
use crate::core::time::FrameIndex;

/// Errors building a timeline
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineError {
    #[error("clip at frame {start} is empty")]
    EmptyClip { start: FrameIndex },
    #[error("clip [{start}, {end}) overlaps clip starting at {existing}")]
    Overlap {
        start: FrameIndex,
        end: FrameIndex,
        existing: FrameIndex,
    },
    #[error("clip rate must be positive, got {0}")]
    InvalidRate(Rational64),
}

/// Inclusive frame range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub first: FrameIndex,
    pub last: FrameIndex,
}

impl FrameRange {
    pub fn new(first: FrameIndex, last: FrameIndex) -> Self {
        debug_assert!(first <= last);
        Self { first, last }
    }

    pub fn contains(&self, frame: FrameIndex) -> bool {
        frame >= self.first && frame <= self.last
    }

    /// Number of frames in the range (never 0).
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Clamp a possibly negative or oversized frame into the range.
    pub fn clamp(&self, frame: i64) -> FrameIndex {
        if frame < 0 {
            return self.first;
        }
        (frame as u64).clamp(self.first, self.last)
    }
}

/// One layer of clips
#[derive(Debug, Clone, Default)]
pub struct Track {
    pub name: String,
    pub disabled: bool,
    clips: BTreeMap<FrameIndex, Clip>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            clips: BTreeMap::new(),
        }
    }

    /// Place `clip` at `start`. Rejects empty clips and overlaps.
    pub fn insert(&mut self, start: FrameIndex, clip: Clip) -> Result<(), TimelineError> {
        let length = clip.length();
        if length == 0 {
            return Err(TimelineError::EmptyClip { start });
        }
        let end = start.saturating_add(length);

        // Previous clip must end at or before `start`
        if let Some((&prev_start, prev)) = self.clips.range(..=start).next_back()
            && prev_start + prev.length() > start
        {
            return Err(TimelineError::Overlap {
                start,
                end,
                existing: prev_start,
            });
        }
        // Next clip must begin at or after `end`
        if let Some((&next_start, _)) = self
            .clips
            .range((Bound::Excluded(start), Bound::Unbounded))
            .next()
            && next_start < end
        {
            return Err(TimelineError::Overlap {
                start,
                end,
                existing: next_start,
            });
        }

        self.clips.insert(start, clip);
        Ok(())
    }

    /// Builder form of [`Track::insert`].
    pub fn with_clip(mut self, start: FrameIndex, clip: Clip) -> Result<Self, TimelineError> {
        self.insert(start, clip)?;
        Ok(self)
    }

    /// Clip covering `frame` with its start frame, or `None` in a gap.
    pub fn clip_containing(&self, frame: FrameIndex) -> Option<(FrameIndex, &Clip)> {
        let (&start, clip) = self.clips.range(..=frame).next_back()?;
        (frame < start + clip.length()).then_some((start, clip))
    }

    /// Stream frame shown at timeline `frame`, if any.
    pub fn media_frame_reference_at(&self, frame: FrameIndex) -> Option<MediaFrameReference> {
        let (start, clip) = self.clip_containing(frame)?;
        clip.reference_at(frame - start)
    }

    /// Inclusive range covered by this track's clips.
    pub fn range(&self) -> Option<FrameRange> {
        let (&first, _) = self.clips.first_key_value()?;
        let (&last_start, last) = self.clips.last_key_value()?;
        Some(FrameRange::new(first, last_start + last.length() - 1))
    }

    pub fn clips(&self) -> impl Iterator<Item = (FrameIndex, &Clip)> {
        self.clips.iter().map(|(&start, clip)| (start, clip))
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Whether any clip of this track shows `reference`.
    pub fn references(&self, reference: &MediaFrameReference) -> bool {
        self.clips.values().any(|clip| {
            clip.stream().is_some_and(|s| s.id() == reference.stream) && clip.reaches(reference.frame)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Timeline {
    tracks: Vec<Track>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    /// Inclusive `(first, last)` across all tracks; `(0, 0)` when empty.
    pub fn range(&self) -> FrameRange {
        self.tracks
            .iter()
            .filter_map(Track::range)
            .reduce(|a, b| FrameRange::new(a.first.min(b.first), a.last.max(b.last)))
            .unwrap_or(FrameRange::new(0, 0))
    }

    /// References shown at `frame` by enabled tracks, top track first.
    pub fn media_frame_references_at(&self, frame: FrameIndex) -> Vec<MediaFrameReference> {
        self.tracks
            .iter()
            .filter(|t| !t.disabled)
            .filter_map(|t| t.media_frame_reference_at(frame))
            .collect()
    }

    /// Whether `reference` is still reachable from some track at some frame.
    pub fn references(&self, reference: &MediaFrameReference) -> bool {
        self.tracks.iter().any(|t| t.references(reference))
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}
