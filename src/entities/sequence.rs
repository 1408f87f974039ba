//! Image sequences on disk as a media stream
//!
//! `shot.0001.exr` is split into prefix `shot.`, number 1 and extension `exr`;
//! all siblings matching `shot.*.exr` with a numeric tail form the sequence.
//! Local frame 0 is the lowest number found. Holes in the numbering decode as
//! failures, which the cache turns into standing misses.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use super::media::{DecodeError, DecodedImage, MediaStream, PixelFormat, StreamId};

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("glob entry error: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("no files matched {0}")]
    Empty(String),
}

/// Numbered image files read through the `image` crate
pub struct ImageSequence {
    id: StreamId,
    name: String,
    pattern: String,
    first: u64,
    last: u64,
    files: BTreeMap<u64, PathBuf>,
}

impl fmt::Debug for ImageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSequence")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("range", &(self.first, self.last))
            .field("files", &self.files.len())
            .finish()
    }
}

impl ImageSequence {
    /// Sequence containing `path`, or a one-frame stream if the name has no
    /// frame number.
    pub fn detect(path: &Path) -> Result<Self, SequenceError> {
        let Some(split) = split_sequence_path(path) else {
            if !path.is_file() {
                return Err(SequenceError::Empty(path.display().to_string()));
            }
            let mut files = BTreeMap::new();
            files.insert(0, path.to_path_buf());
            info!("Single image: {}", path.display());
            return Ok(Self::from_files(path.display().to_string(), stem_of(path), files));
        };

        let pattern = format!("{}*.{}", glob::Pattern::escape(&split.prefix), split.ext);
        let mut files = BTreeMap::new();
        for entry in glob::glob(&pattern).map_err(|source| SequenceError::Pattern {
            pattern: pattern.clone(),
            source,
        })? {
            let candidate = entry?;
            // Keep only siblings with the same prefix/extension and a numeric tail
            if let Some(other) = split_sequence_path(&candidate)
                && other.prefix == split.prefix
                && other.ext == split.ext
            {
                files.insert(other.number, candidate);
            }
        }
        if files.is_empty() {
            return Err(SequenceError::Empty(pattern));
        }

        let name = split
            .prefix
            .rsplit(std::path::MAIN_SEPARATOR)
            .next()
            .unwrap_or_default()
            .trim_end_matches(['.', '_', '-'])
            .to_string();
        let sequence = Self::from_files(pattern, name, files);
        info!(
            "Detected sequence: {} ({} files, frames {}..{}, padding {})",
            sequence.pattern,
            sequence.files.len(),
            sequence.first,
            sequence.last,
            split.padding
        );
        Ok(sequence)
    }

    fn from_files(pattern: String, name: String, files: BTreeMap<u64, PathBuf>) -> Self {
        let first = files.keys().next().copied().unwrap_or(0);
        let last = files.keys().next_back().copied().unwrap_or(0);
        Self {
            id: StreamId::new(),
            name,
            pattern,
            first,
            last,
            files,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// File number of local frame 0
    pub fn first_number(&self) -> u64 {
        self.first
    }

    /// Files actually present (may be fewer than `frame_count` with holes).
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn path_of(&self, frame: u64) -> Option<&Path> {
        self.files.get(&(self.first + frame)).map(PathBuf::as_path)
    }
}

impl MediaStream for ImageSequence {
    fn id(&self) -> StreamId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn frame_count(&self) -> u64 {
        self.last - self.first + 1
    }

    fn decode(&self, frame: u64) -> Result<DecodedImage, DecodeError> {
        let count = self.frame_count();
        if frame >= count {
            return Err(DecodeError::OutOfRange { frame, count });
        }
        let path = self.path_of(frame).ok_or_else(|| {
            DecodeError::Failed(format!("{}: no file for frame {}", self.pattern, self.first + frame))
        })?;

        let image = image::open(path)
            .map_err(|source| DecodeError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .into_rgba8();
        debug!("Decoded {} ({}x{})", path.display(), image.width(), image.height());

        Ok(DecodedImage {
            width: image.width(),
            height: image.height(),
            format: PixelFormat::Rgba8,
            pixels: image.into_raw(),
        })
    }
}

/// Parts of a numbered file name
#[derive(Debug, Clone, PartialEq, Eq)]
struct SequencePath {
    /// Directory plus the name up to the number, e.g. `/shots/seq.`
    prefix: String,
    number: u64,
    ext: String,
    padding: usize,
}

/// Split `"/path/seq.0001.exr"` into `("/path/seq.", 1, "exr", 4)`.
fn split_sequence_path(path: &Path) -> Option<SequencePath> {
    let ext = path.extension()?.to_str()?.to_string();
    let stem = path.file_stem()?.to_str()?;

    let digit_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    let digits = &stem[digit_start..];
    let number = digits.parse::<u64>().ok()?;

    let mut prefix = String::new();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        prefix.push_str(&parent.to_string_lossy());
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }
    }
    prefix.push_str(&stem[..digit_start]);

    Some(SequencePath {
        prefix,
        number,
        ext,
        padding: digits.len(),
    })
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("playhead-seq-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_frame(dir: &Path, name: &str, shade: u8) {
        let img = RgbaImage::from_pixel(4, 3, Rgba([shade, 0, 0, 255]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_split_sequence_path() {
        let split = split_sequence_path(Path::new("/shots/seq.0012.exr")).unwrap();
        assert_eq!(split.number, 12);
        assert_eq!(split.ext, "exr");
        assert_eq!(split.padding, 4);
        assert!(split.prefix.ends_with("seq."));

        let bare = split_sequence_path(Path::new("frame_7.png")).unwrap();
        assert_eq!((bare.prefix.as_str(), bare.number), ("frame_", 7));

        assert!(split_sequence_path(Path::new("/shots/plate.exr")).is_none());
        assert!(split_sequence_path(Path::new("/shots/0010")).is_none());
    }

    /// Test: detection from one file, with a hole in the numbering
    #[test]
    fn test_detect_and_decode() {
        let dir = scratch_dir();
        write_frame(&dir, "shot.0010.png", 10);
        write_frame(&dir, "shot.0011.png", 11);
        write_frame(&dir, "shot.0013.png", 13);
        write_frame(&dir, "other.0012.png", 99);

        let seq = ImageSequence::detect(&dir.join("shot.0011.png")).unwrap();
        assert_eq!(seq.name(), "shot");
        assert_eq!(seq.first_number(), 10);
        assert_eq!(seq.frame_count(), 4);
        assert_eq!(seq.file_count(), 3);

        let img = seq.decode(3).unwrap();
        assert_eq!((img.width, img.height, img.format), (4, 3, PixelFormat::Rgba8));
        assert_eq!(&img.pixels[..4], &[13, 0, 0, 255]);

        assert!(matches!(seq.decode(2), Err(DecodeError::Failed(_))));
        assert!(matches!(seq.decode(4), Err(DecodeError::OutOfRange { .. })));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_single_file_and_missing() {
        let dir = scratch_dir();
        write_frame(&dir, "still.png", 1);
        let seq = ImageSequence::detect(&dir.join("still.png")).unwrap();
        assert_eq!(seq.frame_count(), 1);
        assert!(seq.decode(0).is_ok());

        assert!(matches!(
            ImageSequence::detect(&dir.join("nothing.png")),
            Err(SequenceError::Empty(_))
        ));
        assert!(matches!(
            ImageSequence::detect(&dir.join("nothing.0001.png")),
            Err(SequenceError::Empty(_))
        ));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_decode_error() {
        let dir = scratch_dir();
        std::fs::write(dir.join("bad.0001.png"), b"not a png").unwrap();
        let seq = ImageSequence::detect(&dir.join("bad.0001.png")).unwrap();
        assert!(matches!(seq.decode(0), Err(DecodeError::Image { .. })));
        std::fs::remove_dir_all(dir).ok();
    }
}
