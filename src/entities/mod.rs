//! Entities - timeline structure and the media/texture contracts
//!
//! - Timeline: tracks of clips, queried by frame
//! - Media: decodable streams (synthetic, image sequences)
//! - Texture: GPU-resident handles and the uploader contract
//! - View: per-session display parameters

pub mod clip;
pub mod media;
pub mod sequence;
pub mod texture;
pub mod timeline;
pub mod view;

pub use clip::{Clip, MediaFrameReference, Overlay};
pub use media::{DecodeError, DecodedImage, MediaStream, PixelFormat, StreamId, SyntheticStream};
pub use sequence::ImageSequence;
pub use texture::{GpuTexture, LoadedTexture, MemoryUploader, TextureBinding, TextureUploader};
pub use timeline::{FrameRange, Timeline, TimelineError, Track};
pub use view::{Channel, ChannelMask, FitMode, ViewState};
