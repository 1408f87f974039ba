//! Playhead - playback clock and predictive texture cache
//!
//! Re-exports all modules for use by binary targets.

// Core engine (clock, cache, session loop, workers)
pub mod core;

// Timeline, media and view types
pub mod entities;

// App modules
pub mod cli;
pub mod config;
pub mod paths;

// Re-export commonly used types from core
pub use crate::core::cache_state::CacheState;
pub use crate::core::player::{EndBehavior, Player};
pub use crate::core::session::{Renderer, Session, TickReport};
pub use crate::core::texture_cache::{CacheConfig, TextureCache};
pub use crate::core::window::IterationMode;

// Re-export entities
pub use entities::{Clip, MediaFrameReference, Timeline, Track};
