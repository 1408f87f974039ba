//! Core engine modules - clock, cache, input, workers
//!
//! These modules form the playback engine, independent of any window system.

pub mod backoff;
pub mod cache_state;
pub mod input;
pub mod metronome;
pub mod player;
pub mod session;
pub mod texture_cache;
pub mod time;
pub mod window;
pub mod workers;

// Re-exports for convenience
pub use cache_state::{CacheCounters, CacheState};
pub use input::{InputEvent, InputReceiver, InputSender, input_queue};
pub use player::Player;
pub use texture_cache::TextureCache;
pub use time::{FrameDuration, FrameIndex, Time};
pub use window::{IterationMode, PausedPrefetch, PrefetchWindow};
pub use workers::Workers;
