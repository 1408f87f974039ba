//! One playback session: the driving loop around Player and TextureCache
//!
//! **Why**: the display loop has a strict per-tick order and must never stall
//! on a decode. [`Session::tick`] is that order in one place:
//!
//! 1. input devices are polled elsewhere and push into the input queue
//! 2. read the playhead (frame, time, speed)
//! 3. derive the iteration mode and `prepare` the cache
//! 4. per enabled track: query the texture; draw it on a hit, draw a
//!    placeholder on a miss; draw the clip overlay
//! 5. advance the clock by the real elapsed time
//! 6. poll cache diagnostics (throttled, ≥100ms)
//! 7. drain queued input and apply it to the player or the view
//!
//! The view state (zoom, pan, exposure, channels, fit) is owned here and
//! passed by reference to the renderer each tick. Input that changes playback
//! or the view leaves a short status message on screen.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use super::cache_state::CacheState;
use super::input::{InputEvent, InputReceiver};
use super::metronome::{MIN_STATS_INTERVAL, Metronome, Throttle};
use super::player::Player;
use super::texture_cache::TextureCache;
use super::time::{FrameIndex, Time};
use super::window::IterationMode;
use crate::entities::clip::{MediaFrameReference, Overlay};
use crate::entities::texture::{LoadedTexture, TextureBinding};
use crate::entities::view::ViewState;

/// Drawing backend for one tick. Only borrows textures.
pub trait Renderer {
    fn begin_frame(&mut self, frame: FrameIndex, view: &ViewState);

    fn draw_texture(&mut self, texture: &TextureBinding<'_>, view: &ViewState);

    /// Miss path: the frame is not resident yet (or failed to decode).
    fn draw_placeholder(&mut self, reference: &MediaFrameReference, view: &ViewState);

    fn draw_overlay(&mut self, overlay: &dyn Overlay, view: &ViewState) {
        overlay.render(view);
    }

    fn draw_metadata(&mut self, _texture: &LoadedTexture, _view: &ViewState) {}

    /// `tick_rate` counts loop iterations, `frame_rate` only ticks that
    /// showed a different frame.
    fn draw_statistics(&mut self, _state: &CacheState, _tick_rate: f64, _frame_rate: f64) {}

    fn draw_status(&mut self, _message: &str) {}

    fn end_frame(&mut self) {}
}

/// How long a status message stays on screen
pub const STATUS_DURATION: Duration = Duration::from_secs(2);

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frame displayed this tick
    pub frame: FrameIndex,
    pub speed: i32,
    pub mode: Option<IterationMode>,
    pub hits: usize,
    pub misses: usize,
    /// Diagnostics were refreshed this tick
    pub polled: bool,
    /// Quit was requested
    pub quit: bool,
}

pub struct Session {
    player: Player,
    cache: TextureCache,
    view: ViewState,
    input: InputReceiver,
    stats_throttle: Throttle,
    metronome: Metronome,
    frame_metronome: Metronome,
    last_displayed: Option<FrameIndex>,
    status: Option<(String, Duration)>,
    state: CacheState,
    show_statistics: bool,
    show_metadata: bool,
    unlimited_fps: bool,
    fit_pending: bool,
    quit: bool,
}

impl Session {
    pub fn new(player: Player, cache: TextureCache, input: InputReceiver) -> Self {
        info!(
            "Session started: frame {}, speed {}, {}",
            player.current_frame(),
            player.playback_speed(),
            player.frame_duration()
        );
        Self {
            player,
            cache,
            view: ViewState::default(),
            input,
            stats_throttle: Throttle::new(MIN_STATS_INTERVAL),
            metronome: Metronome::new(),
            frame_metronome: Metronome::new(),
            last_displayed: None,
            status: None,
            state: CacheState::default(),
            show_statistics: false,
            show_metadata: false,
            unlimited_fps: false,
            fit_pending: true,
            quit: false,
        }
    }

    /// Diagnostics polling interval, never below 100ms.
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_throttle = Throttle::new(interval.max(MIN_STATS_INTERVAL));
        self
    }

    /// Advance exactly one frame duration per tick instead of real time.
    pub fn with_unlimited_fps(mut self, unlimited: bool) -> Self {
        self.unlimited_fps = unlimited;
        self
    }

    pub fn with_view(mut self, view: ViewState) -> Self {
        self.view = view;
        self
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    pub fn cache(&self) -> &TextureCache {
        &self.cache
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Last polled diagnostics snapshot.
    pub fn cache_state(&self) -> &CacheState {
        &self.state
    }

    pub fn show_statistics(&self) -> bool {
        self.show_statistics
    }

    pub fn show_metadata(&self) -> bool {
        self.show_metadata
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Status message currently on screen.
    pub fn status(&self) -> Option<&str> {
        self.status.as_ref().map(|(message, _)| message.as_str())
    }

    /// Displayed frames per second, as opposed to loop iterations.
    pub fn frame_rate(&self) -> f64 {
        self.frame_metronome.rate()
    }

    fn set_status(&mut self, message: String) {
        debug!("Status: {}", message);
        self.status = Some((message, STATUS_DURATION));
    }

    /// Tick using the real time since the previous `tick_now`.
    pub fn tick_now(&mut self, renderer: &mut dyn Renderer) -> TickReport {
        let elapsed = self.metronome.tick(Instant::now());
        self.tick(elapsed, renderer)
    }

    /// Run one driving-loop iteration. Never blocks on the cache.
    pub fn tick(&mut self, elapsed: Duration, renderer: &mut dyn Renderer) -> TickReport {
        let frame = self.player.current_frame();
        let speed = self.player.playback_speed();
        let mode = IterationMode::from_speed(speed);
        trace!(
            "Tick: frame {} at {} speed {} ({})",
            frame,
            self.player.playback_time(),
            speed,
            mode
        );

        self.cache.prepare(frame, mode);

        let mut report = TickReport {
            frame,
            speed,
            mode: Some(mode),
            ..TickReport::default()
        };

        if self.last_displayed != Some(frame) {
            self.frame_metronome.tick(Instant::now());
            self.last_displayed = Some(frame);
        }

        renderer.begin_frame(frame, &self.view);
        let timeline = Arc::clone(self.player.timeline());
        for track in timeline.iter().filter(|t| !t.disabled) {
            let Some((start, clip)) = track.clip_containing(frame) else {
                continue;
            };
            if let Some(reference) = clip.reference_at(frame - start) {
                match self.cache.get_loaded_texture(&reference) {
                    Some(texture) => {
                        report.hits += 1;
                        if self.fit_pending {
                            self.view.apply_fit(texture.width(), texture.height());
                            self.fit_pending = false;
                        }
                        {
                            let binding = texture.scope_bind();
                            renderer.draw_texture(&binding, &self.view);
                        }
                        if self.show_metadata {
                            renderer.draw_metadata(&texture, &self.view);
                        }
                    }
                    None => {
                        report.misses += 1;
                        renderer.draw_placeholder(&reference, &self.view);
                    }
                }
            }
            if let Some(overlay) = clip.overlay() {
                renderer.draw_overlay(overlay.as_ref(), &self.view);
            }
        }

        let advance = if self.unlimited_fps {
            self.player.frame_duration().time()
        } else {
            Time::from_duration(elapsed)
        };
        self.player.offset_playback_time(advance);

        if self.stats_throttle.ready(Instant::now()) {
            self.cache.dump_state(&mut self.state);
            report.polled = true;
        }
        if self.show_statistics {
            renderer.draw_statistics(&self.state, self.metronome.rate(), self.frame_metronome.rate());
        }
        if let Some((message, remaining)) = &mut self.status {
            renderer.draw_status(message);
            *remaining = remaining.saturating_sub(elapsed);
            if remaining.is_zero() {
                self.status = None;
            }
        }
        renderer.end_frame();

        for event in self.input.drain() {
            self.apply(event);
        }
        report.quit = self.quit;
        report
    }

    /// Apply one input event to the player or the view.
    pub fn apply(&mut self, event: InputEvent) {
        trace!("Input: {:?}", event);
        match event {
            InputEvent::TogglePlay => {
                self.player.toggle_play();
                let message = if self.player.is_playing() { "play" } else { "stop" };
                self.set_status(message.to_string());
            }
            InputEvent::SetSpeed(speed) => {
                self.player.set_playback_speed(speed);
                self.set_status(format!("speed {}", speed));
            }
            InputEvent::CueFirst => self.player.cue_first(),
            InputEvent::CueLast => self.player.cue_last(),
            InputEvent::Cue(frame) => self.player.cue(frame),
            InputEvent::Step(delta) => self.player.cue_relative(delta),
            InputEvent::SoloChannel(channel) => {
                self.view.channels = self.view.channels.toggle_solo(channel);
            }
            InputEvent::ExposureUp | InputEvent::ExposureDown | InputEvent::ExposureReset => {
                match event {
                    InputEvent::ExposureUp => self.view.exposure_up(),
                    InputEvent::ExposureDown => self.view.exposure_down(),
                    _ => self.view.reset_exposure(),
                }
                self.set_status(format!("exposure {:.2}", self.view.exposure));
            }
            InputEvent::CycleFitMode => {
                self.view.fit_mode = self.view.fit_mode.next();
                self.fit_pending = true;
                self.set_status(self.view.fit_mode.label().to_string());
            }
            InputEvent::ToggleStatistics => self.show_statistics = !self.show_statistics,
            InputEvent::ToggleMetadata => self.show_metadata = !self.show_metadata,
            InputEvent::Scroll(amount) => self.view.scroll(amount),
            InputEvent::Drag { dx, dy } => self.view.drag(dx, dy),
            InputEvent::Resize { width, height } => {
                self.view.resize(width, height);
                self.fit_pending = true;
            }
            InputEvent::Quit => {
                info!("Quit requested");
                self.quit = true;
            }
        }
    }
}

/// Renderer that only logs what would be drawn and counts it
#[derive(Debug, Default)]
pub struct LoggingRenderer {
    pub frames: u64,
    pub textures: u64,
    pub placeholders: u64,
    pub statuses: u64,
}

impl Renderer for LoggingRenderer {
    fn begin_frame(&mut self, frame: FrameIndex, view: &ViewState) {
        self.frames += 1;
        trace!(
            "Frame {}: zoom {:.3}, exposure {:.3}, fit {}",
            frame, view.zoom, view.exposure, view.fit_mode
        );
    }

    fn draw_texture(&mut self, texture: &TextureBinding<'_>, _view: &ViewState) {
        self.textures += 1;
        let t = texture.texture();
        trace!("Draw {} ({}x{})", t.reference(), t.width(), t.height());
    }

    fn draw_placeholder(&mut self, reference: &MediaFrameReference, _view: &ViewState) {
        self.placeholders += 1;
        trace!("Missing frame {}", reference);
    }

    fn draw_statistics(&mut self, state: &CacheState, tick_rate: f64, frame_rate: f64) {
        debug!("{} at {:.1} Hz ({:.1} fps shown)", state.summary(), tick_rate, frame_rate);
    }

    fn draw_status(&mut self, message: &str) {
        self.statuses += 1;
        trace!("Status: {}", message);
    }
}
