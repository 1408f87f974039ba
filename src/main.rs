use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use playhead::cli::Args;
use playhead::config::PlaybackConfig;
use playhead::core::input::{InputEvent, input_queue};
use playhead::core::player::Player;
use playhead::core::session::{LoggingRenderer, Session};
use playhead::core::texture_cache::TextureCache;
use playhead::entities::clip::Clip;
use playhead::entities::media::{MediaStream, SyntheticStream};
use playhead::entities::sequence::ImageSequence;
use playhead::entities::texture::MemoryUploader;
use playhead::entities::timeline::{Timeline, Track};
use playhead::paths::{self, PathConfig};

fn init_logging(args: &Args, dirs: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::data_file("playhead.log", dirs));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, RUST_LOG wins if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn open_stream(args: &Args) -> Result<Arc<dyn MediaStream>> {
    match &args.sequence {
        Some(path) => {
            let sequence = ImageSequence::detect(path)
                .with_context(|| format!("Failed to open sequence: {}", path.display()))?;
            Ok(Arc::new(sequence))
        }
        None => {
            let (width, height) = args.frame_size();
            info!("No sequence given, playing {} synthetic frames", args.frames);
            Ok(Arc::new(
                SyntheticStream::new("synthetic", args.frames).with_size(width, height),
            ))
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let dirs = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&dirs) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &dirs)?;
    debug!("Command-line args: {:?}", args);

    let mut config =
        PlaybackConfig::discover(args.config.as_deref(), &dirs).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    debug!("Effective config: {:?}", config);

    let stream = open_stream(&args)?;
    let track = Track::new("v1").with_clip(0, Clip::whole(stream))?;
    let timeline = Arc::new(Timeline::new().with_track(track));

    let mut player = Player::new(Arc::clone(&timeline), config.frame_duration()?);
    player.set_end_behavior(config.end_behavior);
    player.set_playback_speed(config.initial_speed);
    if let Some(frame) = args.start_frame {
        player.cue(frame);
    }

    let cache = TextureCache::new(timeline, config.cache_config(), Arc::new(MemoryUploader::new()))
        .context("Failed to create texture cache")?;

    let (input, events) = input_queue(config.input_queue);
    let mut session = Session::new(player, cache, events)
        .with_stats_interval(config.stats_interval())
        .with_unlimited_fps(config.unlimited_fps);
    if args.stats {
        input.send(InputEvent::ToggleStatistics);
    }

    let mut renderer = LoggingRenderer::default();
    let interval = Duration::from_millis(args.tick_ms);
    for _ in 0..args.ticks {
        let report = session.tick_now(&mut renderer);
        if report.quit {
            break;
        }
        if !config.unlimited_fps {
            std::thread::sleep(interval);
        }
    }

    let state = session.cache().snapshot();
    info!(
        "Played {} ticks: {} textures drawn, {} placeholders, final frame {}",
        renderer.frames,
        renderer.textures,
        renderer.placeholders,
        session.player().current_frame()
    );
    info!("{}", state.summary());
    println!("{}", serde_json::to_string_pretty(&state)?);

    Ok(())
}
