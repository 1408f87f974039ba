//! Playback configuration
//!
//! Loaded from JSON (`playhead.json` in the config dir, or `--config FILE`).
//! Every field has a default so a partial file is fine:
//!
//! ```json
//! { "fps_num": 24000, "fps_den": 1001, "lookahead": 12, "capacity": 48 }
//! ```
//!
//! CLI flags are applied on top by the binary, then [`PlaybackConfig::validate`]
//! runs once before anything is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::input::DEFAULT_QUEUE_SIZE;
use crate::core::metronome::MIN_STATS_INTERVAL;
use crate::core::player::EndBehavior;
use crate::core::texture_cache::CacheConfig;
use crate::core::time::{FrameDuration, TimeError};
use crate::core::window::PausedPrefetch;
use crate::paths::{self, PathConfig};

/// Default config file name
pub const CONFIG_FILE: &str = "playhead.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    FrameRate(#[from] TimeError),
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
    #[error("input queue must hold at least 1 event")]
    ZeroInputQueue,
    #[error("stats interval must be at least 100ms, got {0}ms")]
    StatsInterval(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Frame rate numerator (24000 for 23.976)
    pub fps_num: i64,
    /// Frame rate denominator (1001 for 23.976)
    pub fps_den: i64,
    /// Speed at session start, 0 = paused
    pub initial_speed: i32,
    /// Look-ahead window K, in frames
    pub lookahead: u64,
    /// Max resident textures
    pub capacity: usize,
    /// Decode threads, `None` = 3/4 of the CPUs
    pub workers: Option<usize>,
    pub paused_prefetch: PausedPrefetch,
    pub end_behavior: EndBehavior,
    pub failure_backoff_ms: u64,
    pub failure_backoff_max_ms: u64,
    pub stats_interval_ms: u64,
    pub input_queue: usize,
    /// Advance one frame per tick regardless of real time
    pub unlimited_fps: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fps_num: 24,
            fps_den: 1,
            initial_speed: 1,
            lookahead: 25,
            capacity: 64,
            workers: None,
            paused_prefetch: PausedPrefetch::default(),
            end_behavior: EndBehavior::default(),
            failure_backoff_ms: 250,
            failure_backoff_max_ms: 10_000,
            stats_interval_ms: 100,
            input_queue: DEFAULT_QUEUE_SIZE,
            unlimited_fps: false,
        }
    }
}

impl PlaybackConfig {
    /// Read a config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config: {}", path.display());
        Ok(config)
    }

    /// `explicit` file if given, else `playhead.json` from the config dir if
    /// it exists, else defaults.
    pub fn discover(explicit: Option<&Path>, dirs: &PathConfig) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let path = paths::config_file(CONFIG_FILE, dirs);
        if path.is_file() {
            Self::load(&path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame_duration()?;
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.input_queue == 0 {
            return Err(ConfigError::ZeroInputQueue);
        }
        if Duration::from_millis(self.stats_interval_ms) < MIN_STATS_INTERVAL {
            return Err(ConfigError::StatsInterval(self.stats_interval_ms));
        }
        Ok(())
    }

    pub fn frame_duration(&self) -> Result<FrameDuration, ConfigError> {
        Ok(FrameDuration::from_fps(self.fps_num, self.fps_den)?)
    }

    /// Decode threads: configured count, or 3/4 of the CPUs (at least one).
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get() * 3 / 4)
            .max(1)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.capacity,
            lookahead: self.lookahead,
            workers: self.worker_count(),
            paused_prefetch: self.paused_prefetch,
            failure_backoff: Duration::from_millis(self.failure_backoff_ms),
            failure_backoff_max: Duration::from_millis(self.failure_backoff_max_ms),
        }
    }
}
