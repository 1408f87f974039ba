//! Media streams: the decode side of the texture pipeline
//!
//! The cache never decodes anything itself. It resolves a
//! [`MediaFrameReference`](super::clip::MediaFrameReference) to a stream and
//! asks the stream for one local frame, on a worker thread.
//!
//! [`SyntheticStream`] produces procedural frames and is what the headless
//! demo and the tests play. Frames can be marked as failing and decode can be
//! slowed down to exercise cancellation.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable identity of a media stream. Part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(self) -> Uuid {
        self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell streams apart in logs
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Pixel layout of a decoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8,   // 8-bit RGBA (LDR)
    Rgba32F, // 32-bit float RGBA (HDR), stored as native-endian bytes
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba32F => 16,
        }
    }
}

/// CPU-side decoded frame, ready for upload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Frame decode errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame {frame} out of range (stream has {count} frames)")]
    OutOfRange { frame: u64, count: u64 },
    #[error("failed to read {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("decode failed: {0}")]
    Failed(String),
}

/// A decodable sequence of frames, addressed by local frame index.
///
/// Implementations must be callable from any worker thread.
pub trait MediaStream: Send + Sync + fmt::Debug {
    fn id(&self) -> StreamId;

    fn name(&self) -> &str;

    fn frame_count(&self) -> u64;

    /// Decode one local frame. Called on worker threads, may block.
    fn decode(&self, frame: u64) -> Result<DecodedImage, DecodeError>;
}

/// Procedural stream: each frame is a flat RGBA color derived from its index.
#[derive(Debug)]
pub struct SyntheticStream {
    id: StreamId,
    name: String,
    frames: u64,
    width: u32,
    height: u32,
    failing: HashSet<u64>,
    latency: Option<Duration>,
    decodes: AtomicUsize,
}

impl SyntheticStream {
    pub fn new(name: impl Into<String>, frames: u64) -> Self {
        Self {
            id: StreamId::new(),
            name: name.into(),
            frames,
            width: 16,
            height: 9,
            failing: HashSet::new(),
            latency: None,
            decodes: AtomicUsize::new(0),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Frames that always fail to decode.
    pub fn with_failing(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(frames);
        self
    }

    /// Sleep this long in every decode.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of decode attempts so far (including failed ones).
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }
}

impl MediaStream for SyntheticStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn frame_count(&self) -> u64 {
        self.frames
    }

    fn decode(&self, frame: u64) -> Result<DecodedImage, DecodeError> {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if frame >= self.frames {
            return Err(DecodeError::OutOfRange {
                frame,
                count: self.frames,
            });
        }
        if self.failing.contains(&frame) {
            return Err(DecodeError::Failed(format!("{}: corrupt frame {}", self.name, frame)));
        }

        let shade = (frame % 256) as u8;
        let px = [shade, 255 - shade, (frame / 256 % 256) as u8, 255];
        let count = self.width as usize * self.height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&px);
        }

        Ok(DecodedImage {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba8,
            pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_decode() {
        let stream = SyntheticStream::new("bars", 10).with_size(4, 2);
        let img = stream.decode(3).unwrap();
        assert_eq!((img.width, img.height), (4, 2));
        assert_eq!(img.byte_size(), 4 * 2 * 4);
        assert_eq!(&img.pixels[..4], &[3, 252, 0, 255]);
        assert_eq!(stream.decode_count(), 1);
    }

    #[test]
    fn test_synthetic_failures() {
        let stream = SyntheticStream::new("bad", 10).with_failing([5]);
        assert!(matches!(stream.decode(5), Err(DecodeError::Failed(_))));
        assert!(matches!(
            stream.decode(10),
            Err(DecodeError::OutOfRange { frame: 10, count: 10 })
        ));
        assert_eq!(stream.decode_count(), 2);
    }

    #[test]
    fn test_stream_ids_unique() {
        let a = SyntheticStream::new("a", 1);
        let b = SyntheticStream::new("b", 1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().to_string().len(), 8);
    }
}
