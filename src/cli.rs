use clap::Parser;
use std::path::PathBuf;

use crate::config::PlaybackConfig;
use crate::core::player::EndBehavior;
use crate::core::window::PausedPrefetch;

/// Headless playback driver: plays a sequence through the texture cache and
/// prints cache diagnostics as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Any frame of an image sequence (EXR, PNG, JPEG, TIFF, TGA, HDR).
    /// Without it a synthetic sequence is played.
    #[arg(value_name = "SEQUENCE")]
    pub sequence: Option<PathBuf>,

    /// Length of the synthetic sequence
    #[arg(long = "frames", value_name = "N", default_value_t = 240)]
    pub frames: u64,

    /// Synthetic frame size
    #[arg(long = "size", value_names = ["W", "H"], num_args = 2, default_values_t = [1920, 1080])]
    pub size: Vec<u32>,

    /// Frame rate, integer or ratio (24, 30, 24000/1001)
    #[arg(long = "fps", value_name = "RATE", value_parser = parse_fps)]
    pub fps: Option<(i64, i64)>,

    /// Initial playback speed (negative plays backward, 0 paused)
    #[arg(long = "speed", value_name = "N", allow_negative_numbers = true)]
    pub speed: Option<i32>,

    /// Start frame
    #[arg(long = "frame", value_name = "N")]
    pub start_frame: Option<i64>,

    /// Look-ahead window size in frames
    #[arg(short = 'k', long = "lookahead", value_name = "K")]
    pub lookahead: Option<u64>,

    /// Maximum resident textures
    #[arg(long = "capacity", value_name = "N")]
    pub capacity: Option<usize>,

    /// Decode worker threads
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Paused prefetch policy: pingpong or current
    #[arg(long = "paused", value_name = "POLICY")]
    pub paused_prefetch: Option<PausedPrefetch>,

    /// What to do at the ends: loop or stop
    #[arg(long = "end", value_name = "BEHAVIOR")]
    pub end_behavior: Option<EndBehavior>,

    /// Number of loop iterations to run
    #[arg(long = "ticks", value_name = "N", default_value_t = 240)]
    pub ticks: u64,

    /// Display refresh interval simulated between ticks
    #[arg(long = "tick-ms", value_name = "MS", default_value_t = 16)]
    pub tick_ms: u64,

    /// Advance one frame per tick, no sleeping
    #[arg(short = 'u', long = "unlimited-fps")]
    pub unlimited_fps: bool,

    /// Log the statistics line every diagnostics poll
    #[arg(short = 's', long = "stats")]
    pub stats: bool,

    /// Config file (default: playhead.json in the config directory)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Enable logging to file (default: playhead.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Override config values with flags given on the command line.
    pub fn apply(&self, config: &mut PlaybackConfig) {
        if let Some((num, den)) = self.fps {
            config.fps_num = num;
            config.fps_den = den;
        }
        if let Some(speed) = self.speed {
            config.initial_speed = speed;
        }
        if let Some(lookahead) = self.lookahead {
            config.lookahead = lookahead;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        if let Some(policy) = self.paused_prefetch {
            config.paused_prefetch = policy;
        }
        if let Some(end) = self.end_behavior {
            config.end_behavior = end;
        }
        if self.unlimited_fps {
            config.unlimited_fps = true;
        }
    }

    /// Synthetic frame size as (width, height)
    pub fn frame_size(&self) -> (u32, u32) {
        match self.size.as_slice() {
            [w, h] => (*w, *h),
            _ => (1920, 1080),
        }
    }
}

/// "24" -> (24, 1), "24000/1001" -> (24000, 1001)
fn parse_fps(s: &str) -> Result<(i64, i64), String> {
    let (num, den) = match s.split_once('/') {
        Some((n, d)) => (n.trim(), d.trim()),
        None => (s.trim(), "1"),
    };
    let num: i64 = num.parse().map_err(|e| format!("invalid frame rate '{}': {}", s, e))?;
    let den: i64 = den.parse().map_err(|e| format!("invalid frame rate '{}': {}", s, e))?;
    if num <= 0 || den <= 0 {
        return Err(format!("frame rate must be positive, got '{}'", s));
    }
    Ok((num, den))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fps() {
        assert_eq!(parse_fps("24"), Ok((24, 1)));
        assert_eq!(parse_fps("24000/1001"), Ok((24000, 1001)));
        assert!(parse_fps("0").is_err());
        assert!(parse_fps("fast").is_err());
        assert!(parse_fps("24/-1").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "playhead",
            "--fps",
            "30000/1001",
            "--speed",
            "-2",
            "-k",
            "6",
            "--paused",
            "current",
            "--end",
            "stop",
        ]);
        let mut config = PlaybackConfig::default();
        args.apply(&mut config);
        assert_eq!((config.fps_num, config.fps_den), (30000, 1001));
        assert_eq!(config.initial_speed, -2);
        assert_eq!(config.lookahead, 6);
        assert_eq!(config.paused_prefetch, PausedPrefetch::CurrentFrame);
        assert_eq!(config.end_behavior, EndBehavior::Stop);
        assert_eq!(config.capacity, 64);
        assert_eq!(args.frame_size(), (1920, 1080));
    }

    #[test]
    fn test_bad_mode_is_an_error() {
        assert!(Args::try_parse_from(["playhead", "--paused", "sideways"]).is_err());
    }
}
