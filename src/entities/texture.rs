//! GPU-resident textures and the upload contract
//!
//! **Ownership**: the cache owns every [`LoadedTexture`] through an `Arc`.
//! Renderers only ever see `Arc` clones handed out by point queries and take a
//! [`TextureBinding`] for the draw call. The binding unbinds on drop, so an
//! early return or a panic in the draw path cannot leave a texture bound.
//!
//! [`MemoryUploader`] keeps pixels in RAM and counts bind/unbind calls. It is
//! the headless stand-in for a real GL/wgpu uploader.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use thiserror::Error;

use super::clip::MediaFrameReference;
use super::media::{DecodeError, DecodedImage, PixelFormat};

/// Errors producing a resident texture
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Backend texture handle.
pub trait GpuTexture: Send + Sync + fmt::Debug {
    fn bind(&self);

    fn unbind(&self);

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Approximate device memory held by this texture.
    fn byte_size(&self) -> usize;
}

/// Turns decoded pixels into a backend texture. Called on worker threads.
pub trait TextureUploader: Send + Sync {
    fn upload(&self, image: DecodedImage) -> Result<Arc<dyn GpuTexture>, LoadError>;
}

/// A texture resident in the cache for one media frame.
#[derive(Debug)]
pub struct LoadedTexture {
    reference: MediaFrameReference,
    texture: Arc<dyn GpuTexture>,
    loaded_at: Instant,
}

impl LoadedTexture {
    pub fn new(reference: MediaFrameReference, texture: Arc<dyn GpuTexture>) -> Self {
        Self {
            reference,
            texture,
            loaded_at: Instant::now(),
        }
    }

    pub fn reference(&self) -> MediaFrameReference {
        self.reference
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn byte_size(&self) -> usize {
        self.texture.byte_size()
    }

    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    /// Bind for a draw call. Unbound when the returned guard drops.
    pub fn scope_bind(&self) -> TextureBinding<'_> {
        self.texture.bind();
        TextureBinding { texture: self }
    }
}

/// Scoped bind of a [`LoadedTexture`].
pub struct TextureBinding<'a> {
    texture: &'a LoadedTexture,
}

impl TextureBinding<'_> {
    pub fn texture(&self) -> &LoadedTexture {
        self.texture
    }
}

impl Drop for TextureBinding<'_> {
    fn drop(&mut self) {
        self.texture.texture.unbind();
    }
}

/// RAM-backed texture for headless playback and tests
#[derive(Debug)]
pub struct MemoryTexture {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
    bound: AtomicUsize,
}

impl MemoryTexture {
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Current bind depth (0 when nobody is drawing with it).
    pub fn bind_depth(&self) -> usize {
        self.bound.load(Ordering::Acquire)
    }
}

impl GpuTexture for MemoryTexture {
    fn bind(&self) {
        self.bound.fetch_add(1, Ordering::AcqRel);
    }

    fn unbind(&self) {
        // Saturating: an unbalanced unbind must not wrap
        let _ = self
            .bound
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(v.saturating_sub(1)));
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Uploader producing [`MemoryTexture`]s
#[derive(Debug, Default)]
pub struct MemoryUploader {
    uploads: AtomicUsize,
}

impl MemoryUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }
}

impl TextureUploader for MemoryUploader {
    fn upload(&self, image: DecodedImage) -> Result<Arc<dyn GpuTexture>, LoadError> {
        let expected = image.width as usize * image.height as usize * image.format.bytes_per_pixel();
        if image.pixels.len() != expected {
            return Err(LoadError::Upload(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                image.width,
                image.height,
                image.format,
                expected,
                image.pixels.len()
            )));
        }
        self.uploads.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryTexture {
            width: image.width,
            height: image.height,
            format: image.format,
            pixels: image.pixels,
            bound: AtomicUsize::new(0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::media::StreamId;

    fn image(w: u32, h: u32) -> DecodedImage {
        DecodedImage {
            width: w,
            height: h,
            format: PixelFormat::Rgba8,
            pixels: vec![0; (w * h * 4) as usize],
        }
    }

    /// Test: binding guard releases on scope exit
    /// Validates: unbind runs even on early return
    #[test]
    fn test_scope_bind_releases() {
        #[derive(Debug, Default)]
        struct Counting(AtomicUsize);
        impl GpuTexture for Counting {
            fn bind(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn unbind(&self) {
                self.0.fetch_sub(1, Ordering::SeqCst);
            }
            fn width(&self) -> u32 {
                1
            }
            fn height(&self) -> u32 {
                1
            }
            fn byte_size(&self) -> usize {
                4
            }
        }

        let handle = Arc::new(Counting::default());
        let reference = MediaFrameReference::new(StreamId::new(), 0);
        let loaded = LoadedTexture::new(reference, handle.clone());

        fn draw(tex: &LoadedTexture, bail: bool) -> Option<()> {
            let _binding = tex.scope_bind();
            if bail {
                return None;
            }
            Some(())
        }

        assert!(draw(&loaded, true).is_none());
        assert_eq!(handle.0.load(Ordering::SeqCst), 0);
        assert!(draw(&loaded, false).is_some());
        assert_eq!(handle.0.load(Ordering::SeqCst), 0);

        let binding = loaded.scope_bind();
        assert_eq!(handle.0.load(Ordering::SeqCst), 1);
        assert_eq!(binding.texture().reference(), reference);
    }

    #[test]
    fn test_memory_upload() {
        let uploader = MemoryUploader::new();
        let tex = uploader.upload(image(4, 4)).unwrap();
        assert_eq!((tex.width(), tex.height(), tex.byte_size()), (4, 4, 64));
        assert_eq!(uploader.upload_count(), 1);

        let mut bad = image(4, 4);
        bad.pixels.truncate(10);
        assert!(matches!(uploader.upload(bad), Err(LoadError::Upload(_))));
        assert_eq!(uploader.upload_count(), 1);
    }
}
