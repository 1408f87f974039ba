//! Direction-aware texture cache with background prefetch
//!
//! **Why**: the display loop must never wait on a decode. Each tick it tells
//! the cache where the playhead is and which way it is heading
//! ([`TextureCache::prepare`]), then asks for textures with a cheap point query
//! ([`TextureCache::get_loaded_texture`]). Decode and upload happen on worker
//! threads; a miss just means the loop draws a placeholder this tick.
//!
//! # Structure
//!
//! - `entries`: `HashMap<MediaFrameReference, Entry>` behind an `RwLock`.
//!   Workers publish a fully built `Arc<LoadedTexture>` under the write lock,
//!   so readers see the old value or the new one, never half of one.
//! - `lru`: `IndexSet` in access order (front = least recent).
//! - `wanted`: references in the current look-ahead window, each with its
//!   distance in frames from the playhead. Queued jobs check it when they
//!   start and again under the map's write lock before publishing, so work for
//!   frames that fell out of the window is dropped instead of decoded-then-evicted.
//! - `active`: references at the exact current frame; never evicted.
//!
//! Only the `capacity` nearest references of a window are scheduled. A window
//! wider than the cache keeps the frames right after the playhead resident
//! and leaves the far end unloaded.
//!
//! # Eviction
//!
//! At capacity, the least recently used entry outside the window goes first,
//! then the in-window entry farthest from the playhead that is not active.
//! When the new texture is at least as far as every candidate (or only active
//! entries remain) the new texture is discarded, so occupancy never exceeds
//! capacity.
//!
//! # Lock order
//!
//! `entries` → `lru` → `wanted` → `active`. Code holding `wanted` or `active`
//! never takes `entries` or `lru`. `schedule` reads `entries` while holding
//! `in_flight`; nothing takes `in_flight` while holding `entries`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use indexmap::IndexSet;
use log::{debug, info, trace, warn};
use thiserror::Error;

use super::backoff::FailureLog;
use super::cache_state::{CacheCounters, CacheState};
use super::time::FrameIndex;
use super::window::{IterationMode, PausedPrefetch, PrefetchWindow};
use super::workers::Workers;
use crate::entities::clip::MediaFrameReference;
use crate::entities::media::MediaStream;
use crate::entities::texture::{LoadError, LoadedTexture, TextureUploader};
use crate::entities::timeline::Timeline;

/// Cache construction errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
    #[error("failed to spawn cache workers: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Cache tuning
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum resident textures
    pub capacity: usize,
    /// Look-ahead K, in frames
    pub lookahead: u64,
    /// Decode threads
    pub workers: usize,
    /// Behavior while paused (speed 0 maps to ping-pong)
    pub paused_prefetch: PausedPrefetch,
    /// First retry delay after a failed decode
    pub failure_backoff: Duration,
    /// Cap for the doubling retry delay
    pub failure_backoff_max: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            lookahead: 25,
            workers: (num_cpus::get() * 3 / 4).max(1),
            paused_prefetch: PausedPrefetch::default(),
            failure_backoff: Duration::from_millis(250),
            failure_backoff_max: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct Entry {
    texture: Arc<LoadedTexture>,
    bytes: usize,
}

/// State shared with worker jobs
struct Shared {
    entries: RwLock<HashMap<MediaFrameReference, Entry>>,
    lru: Mutex<IndexSet<MediaFrameReference>>,
    wanted: RwLock<HashMap<MediaFrameReference, u64>>,
    active: RwLock<HashSet<MediaFrameReference>>,
    in_flight: Mutex<HashSet<MediaFrameReference>>,
    in_flight_count: AtomicUsize,
    failures: FailureLog,
    counters: CacheCounters,
    uploader: Arc<dyn TextureUploader>,
    capacity: usize,
}

/// Control-thread view of the window
struct WindowState {
    timeline: Arc<Timeline>,
    window: Option<PrefetchWindow>,
}

pub struct TextureCache {
    shared: Arc<Shared>,
    state: Mutex<WindowState>,
    config: CacheConfig,
    workers: Workers,
}

impl TextureCache {
    /// Create a cache over `timeline`, uploading through `uploader`.
    pub fn new(
        timeline: Arc<Timeline>,
        config: CacheConfig,
        uploader: Arc<dyn TextureUploader>,
    ) -> Result<Self, CacheError> {
        if config.capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        // Ping-pong is the widest shape: ceil(K/2) frames on each side
        let window_frames = 2 * config.lookahead.div_ceil(2) as usize + 1;
        if window_frames > config.capacity {
            warn!(
                "Look-ahead window (up to {} frames) exceeds cache capacity ({}), only the nearest {} are prefetched",
                window_frames, config.capacity, config.capacity
            );
        }

        let workers = Workers::new(config.workers, "playhead-decode")?;

        info!(
            "TextureCache created: capacity={}, lookahead={}, workers={}, paused={:?}",
            config.capacity,
            config.lookahead,
            workers.threads(),
            config.paused_prefetch
        );

        let shared = Shared {
            entries: RwLock::new(HashMap::with_capacity(config.capacity)),
            lru: Mutex::new(IndexSet::with_capacity(config.capacity)),
            wanted: RwLock::new(HashMap::new()),
            active: RwLock::new(HashSet::new()),
            in_flight: Mutex::new(HashSet::new()),
            in_flight_count: AtomicUsize::new(0),
            failures: FailureLog::new(config.failure_backoff, config.failure_backoff_max),
            counters: CacheCounters::new(),
            uploader,
            capacity: config.capacity,
        };

        Ok(Self {
            shared: Arc::new(shared),
            state: Mutex::new(WindowState {
                timeline,
                window: None,
            }),
            config,
            workers,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn timeline(&self) -> Arc<Timeline> {
        Arc::clone(&self.lock_state().timeline)
    }

    /// Window currently being kept resident, if `prepare` ran.
    pub fn window(&self) -> Option<PrefetchWindow> {
        self.lock_state().window
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookahead_for(&self, mode: IterationMode) -> u64 {
        match (mode, self.config.paused_prefetch) {
            (IterationMode::PingPong, PausedPrefetch::CurrentFrame) => 0,
            _ => self.config.lookahead,
        }
    }

    /// Schedule loads so the window around `frame` becomes resident.
    ///
    /// Never blocks on decode: it only updates the window and queues jobs for
    /// frames that are neither resident, in flight, nor backing off.
    pub fn prepare(&self, frame: FrameIndex, mode: IterationMode) {
        let mut state = self.lock_state();
        let timeline = Arc::clone(&state.timeline);
        let window = PrefetchWindow::new(frame, mode, self.lookahead_for(mode), timeline.range());

        if state.window != Some(window) {
            if let Some(previous) = state.window
                && (previous.mode != window.mode || !previous.contains(window.center))
            {
                debug!(
                    "Re-centering window: {} [{}..{}] -> {} [{}..{}]",
                    previous.mode, previous.first, previous.last, window.mode, window.first, window.last
                );
            }
            self.retarget(&timeline, &window);
            state.window = Some(window);
        }
        drop(state);

        self.schedule(&timeline, &window);
    }

    /// Replace the wanted/active sets for a new window.
    ///
    /// Entries are left alone: the ones still inside the new window stay
    /// resident, the others become preferred eviction victims. Jobs for
    /// references not in the new set cancel themselves.
    fn retarget(&self, timeline: &Timeline, window: &PrefetchWindow) {
        let mut wanted = HashMap::with_capacity(window.len() as usize);
        for frame in window.first..=window.last {
            let distance = frame.abs_diff(window.center);
            for reference in timeline.media_frame_references_at(frame) {
                wanted
                    .entry(reference)
                    .and_modify(|d: &mut u64| *d = (*d).min(distance))
                    .or_insert(distance);
            }
        }
        let active: HashSet<_> = timeline
            .media_frame_references_at(window.center)
            .into_iter()
            .collect();

        *self.shared.wanted.write().unwrap_or_else(|e| e.into_inner()) = wanted;
        *self.shared.active.write().unwrap_or_else(|e| e.into_inner()) = active;
    }

    fn schedule(&self, timeline: &Timeline, window: &PrefetchWindow) {
        let now = Instant::now();

        // Nearest-first list of (reference, stream) not yet resident, cut off
        // after the nearest `capacity` references
        let missing: Vec<(MediaFrameReference, Arc<dyn MediaStream>)> = {
            let entries = self.shared.entries.read().unwrap_or_else(|e| e.into_inner());
            let mut out = Vec::new();
            let mut seen = 0;
            'frames: for frame in window.frames() {
                for track in timeline.iter().filter(|t| !t.disabled) {
                    if seen == self.shared.capacity {
                        break 'frames;
                    }
                    let Some((start, clip)) = track.clip_containing(frame) else {
                        continue;
                    };
                    let Some(reference) = clip.reference_at(frame - start) else {
                        continue;
                    };
                    let Some(stream) = clip.stream() else {
                        continue;
                    };
                    seen += 1;
                    if !entries.contains_key(&reference) {
                        out.push((reference, Arc::clone(stream)));
                    }
                }
            }
            out
        };

        for (reference, stream) in missing {
            if self.shared.failures.is_backing_off(&reference, now) {
                continue;
            }
            {
                let mut in_flight = self.shared.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                // A worker may have published and finished since the scan above
                if in_flight.contains(&reference) || self.contains(&reference) {
                    continue;
                }
                in_flight.insert(reference);
                self.shared.in_flight_count.store(in_flight.len(), Ordering::Release);
            }

            self.shared.counters.record_scheduled();
            trace!("Scheduling load: {}", reference);

            let shared = Arc::clone(&self.shared);
            self.workers.execute(move || shared.load(reference, stream.as_ref()));
        }
    }

    /// Resident texture for `reference`, or `None` on a miss.
    ///
    /// A hit refreshes the entry's recency. Misses are counted, never errors.
    pub fn get_loaded_texture(&self, reference: &MediaFrameReference) -> Option<Arc<LoadedTexture>> {
        // Release the map lock before touching LRU order
        let result = {
            let entries = self.shared.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(reference).map(|e| Arc::clone(&e.texture))
        };

        if result.is_some() {
            self.shared.counters.record_hit();
            let mut lru = self.shared.lru.lock().unwrap_or_else(|e| e.into_inner());
            // Re-inserting moves the key to the back (most recent); skip if a
            // concurrent eviction already removed it
            if lru.shift_remove(reference) {
                lru.insert(*reference);
            }
        } else {
            self.shared.counters.record_miss();
        }

        result
    }

    /// Whether `reference` is resident (no recency or counter update).
    pub fn contains(&self, reference: &MediaFrameReference) -> bool {
        self.shared
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.shared.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads scheduled and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight_count.load(Ordering::Acquire)
    }

    /// Fill `state` with a diagnostic snapshot.
    ///
    /// Safe to call while workers publish: counters are atomics and
    /// occupancy is read under the map's read lock.
    pub fn dump_state(&self, state: &mut CacheState) {
        self.shared.counters.fill(state);
        state.occupancy = self.len();
        state.capacity = self.config.capacity;
        state.in_flight = self.in_flight();
        state.backing_off = self.shared.failures.backing_off_count(Instant::now());
        state.window = self.window();
    }

    pub fn snapshot(&self) -> CacheState {
        let mut state = CacheState::default();
        self.dump_state(&mut state);
        state
    }

    /// Rebind to a new timeline.
    ///
    /// Entries no longer reachable from any track are dropped; the rest stay.
    /// The window is recomputed on the next `prepare`.
    pub fn set_timeline(&self, timeline: Arc<Timeline>) {
        let mut state = self.lock_state();
        state.window = None;
        self.shared.wanted.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.shared.active.write().unwrap_or_else(|e| e.into_inner()).clear();

        let removed = {
            let mut entries = self.shared.entries.write().unwrap_or_else(|e| e.into_inner());
            let mut lru = self.shared.lru.lock().unwrap_or_else(|e| e.into_inner());
            let before = entries.len();
            entries.retain(|reference, entry| {
                let keep = timeline.references(reference);
                if !keep {
                    self.shared.counters.free_bytes(entry.bytes);
                }
                keep
            });
            lru.retain(|reference| entries.contains_key(reference));
            before - entries.len()
        };
        self.shared.failures.retain(|r| timeline.references(r));
        state.timeline = timeline;

        info!("Timeline changed: invalidated {} cached textures", removed);
    }

    /// Drop every resident texture and failure record.
    pub fn clear(&self) {
        {
            let mut entries = self.shared.entries.write().unwrap_or_else(|e| e.into_inner());
            let mut lru = self.shared.lru.lock().unwrap_or_else(|e| e.into_inner());
            for entry in entries.values() {
                self.shared.counters.free_bytes(entry.bytes);
            }
            entries.clear();
            lru.clear();
        }
        self.shared.failures.clear_all();
        debug!("Cleared texture cache");
    }

    /// Block until no loads are in flight, or `timeout` elapses.
    /// Returns `true` when idle. Not for the display loop.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Times `reference` failed to decode since its last success.
    pub fn failure_attempts(&self, reference: &MediaFrameReference) -> u32 {
        self.shared.failures.attempts(reference)
    }

    pub fn stats(&self) -> &CacheCounters {
        &self.shared.counters
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        // Queued jobs see an empty window and return without decoding
        self.shared.wanted.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Shared {
    fn is_wanted(&self, reference: &MediaFrameReference) -> bool {
        self.wanted
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(reference)
    }

    fn finish(&self, reference: &MediaFrameReference) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(reference);
        self.in_flight_count.store(in_flight.len(), Ordering::Release);
    }

    /// Worker job: decode, upload and publish one reference.
    fn load(&self, reference: MediaFrameReference, stream: &dyn MediaStream) {
        if !self.is_wanted(&reference) {
            trace!("Cancelled before decode: {}", reference);
            self.counters.record_cancelled();
            self.finish(&reference);
            return;
        }

        let result = stream
            .decode(reference.frame)
            .map_err(LoadError::from)
            .and_then(|image| self.uploader.upload(image));

        match result {
            Ok(texture) => {
                self.failures.clear(&reference);
                self.publish(LoadedTexture::new(reference, texture));
            }
            Err(e) => {
                let delay = self.failures.record(reference, Instant::now());
                self.counters.record_failure();
                warn!(
                    "Failed to load {} from '{}': {} (retry in {} ms)",
                    reference,
                    stream.name(),
                    e,
                    delay.as_millis()
                );
            }
        }

        // After publishing: schedule sees the reference in flight or resident
        self.finish(&reference);
    }

    fn publish(&self, texture: LoadedTexture) {
        let reference = texture.reference();
        let bytes = texture.byte_size();

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut lru = self.lru.lock().unwrap_or_else(|e| e.into_inner());
        // Held until the insert so a concurrent retarget cannot slip in between
        let wanted = self.wanted.read().unwrap_or_else(|e| e.into_inner());
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());

        let Some(&distance) = wanted.get(&reference) else {
            trace!("Cancelled after decode: {}", reference);
            self.counters.record_cancelled();
            return;
        };

        if let Some(old) = entries.remove(&reference) {
            // Replacement keeps occupancy unchanged
            self.counters.free_bytes(old.bytes);
            lru.shift_remove(&reference);
            debug!("Replaced texture: {}", reference);
        } else {
            while entries.len() >= self.capacity {
                if !self.evict_one(&mut entries, &mut lru, &wanted, &active, distance) {
                    debug!("Cache full of nearer textures, discarding {}", reference);
                    self.counters.record_dropped();
                    return;
                }
            }
        }

        entries.insert(
            reference,
            Entry {
                texture: Arc::new(texture),
                bytes,
            },
        );
        lru.insert(reference);
        self.counters.add_bytes(bytes);
        self.counters.record_published();
        debug!("Cached texture: {} ({} bytes)", reference, bytes);
    }

    /// Evict one entry to make room for a texture `distance` frames from the
    /// playhead: least recent out-of-window first, else the farthest
    /// non-active in-window entry if it is farther than the newcomer.
    /// Returns `false` when nothing qualifies.
    fn evict_one(
        &self,
        entries: &mut HashMap<MediaFrameReference, Entry>,
        lru: &mut IndexSet<MediaFrameReference>,
        wanted: &HashMap<MediaFrameReference, u64>,
        active: &HashSet<MediaFrameReference>,
        distance: u64,
    ) -> bool {
        let victim = lru.iter().find(|r| !wanted.contains_key(*r)).copied().or_else(|| {
            // Least recent wins ties
            let mut farthest: Option<(MediaFrameReference, u64)> = None;
            for r in lru.iter().filter(|r| !active.contains(*r)) {
                let d = wanted.get(r).copied().unwrap_or(0);
                if farthest.is_none_or(|(_, best)| d > best) {
                    farthest = Some((*r, d));
                }
            }
            farthest.filter(|&(_, d)| d > distance).map(|(r, _)| r)
        });

        let Some(victim) = victim else {
            return false;
        };

        lru.shift_remove(&victim);
        if let Some(evicted) = entries.remove(&victim) {
            self.counters.free_bytes(evicted.bytes);
            self.counters.record_eviction();
            debug!("Evicted texture: {}", victim);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::clip::Clip;
    use crate::entities::media::SyntheticStream;
    use crate::entities::texture::MemoryUploader;
    use crate::entities::timeline::Track;

    const IDLE: Duration = Duration::from_secs(10);

    fn config(capacity: usize, lookahead: u64) -> CacheConfig {
        CacheConfig {
            capacity,
            lookahead,
            workers: 2,
            paused_prefetch: PausedPrefetch::PingPong,
            failure_backoff: Duration::from_millis(200),
            failure_backoff_max: Duration::from_secs(2),
        }
    }

    fn single_stream(stream: SyntheticStream) -> (Arc<Timeline>, Arc<SyntheticStream>) {
        let stream = Arc::new(stream);
        let length = stream.frame_count();
        let track = Track::new("v1")
            .with_clip(0, Clip::new(stream.clone(), length))
            .unwrap();
        (Arc::new(Timeline::new().with_track(track)), stream)
    }

    fn cache(timeline: &Arc<Timeline>, capacity: usize, lookahead: u64) -> TextureCache {
        TextureCache::new(
            Arc::clone(timeline),
            config(capacity, lookahead),
            Arc::new(MemoryUploader::new()),
        )
        .unwrap()
    }

    fn at(stream: &SyntheticStream, frame: u64) -> MediaFrameReference {
        MediaFrameReference::new(stream.id(), frame)
    }

    /// Test: forward prefetch fills the window
    /// Validates: capacity=10, K=5 around frame 50, far frame misses
    #[test]
    fn test_forward_window_hits() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 300));
        let cache = cache(&timeline, 10, 5);

        cache.prepare(50, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));

        for frame in 50..=55 {
            assert!(cache.get_loaded_texture(&at(&stream, frame)).is_some(), "frame {frame}");
        }
        assert!(cache.get_loaded_texture(&at(&stream, 200)).is_none());
        assert!(cache.get_loaded_texture(&at(&stream, 49)).is_none());

        let state = cache.snapshot();
        assert_eq!(state.occupancy, 6);
        assert_eq!((state.hits, state.misses), (6, 2));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let (timeline, _) = single_stream(SyntheticStream::new("seq", 10));
        let result = TextureCache::new(timeline, config(0, 5), Arc::new(MemoryUploader::new()));
        assert!(matches!(result, Err(CacheError::ZeroCapacity)));
    }

    /// Test: sliding the playhead never exceeds capacity
    /// Validates: out-of-window entries are evicted first
    #[test]
    fn test_capacity_never_exceeded() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 200));
        let cache = cache(&timeline, 8, 5);

        for frame in 0..40 {
            cache.prepare(frame, IterationMode::Forward);
            assert!(cache.wait_idle(IDLE));
            assert!(cache.len() <= 8);
        }

        // The current window is fully resident, older frames went first
        for frame in 39..=44 {
            assert!(cache.contains(&at(&stream, frame)), "frame {frame}");
        }
        assert!(!cache.contains(&at(&stream, 0)));
        assert!(cache.stats().evictions() > 0);
    }

    /// Test: reversal at a turning point keeps the current frame
    /// Validates: in-window entries survive re-centering
    #[test]
    fn test_reversal_keeps_current_frame() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 200));
        let cache = cache(&timeline, 6, 5);

        cache.prepare(100, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        assert!(cache.contains(&at(&stream, 100)));

        cache.prepare(100, IterationMode::Backward);
        assert!(cache.wait_idle(IDLE));

        assert!(cache.get_loaded_texture(&at(&stream, 100)).is_some());
        for frame in 95..=100 {
            assert!(cache.contains(&at(&stream, frame)), "frame {frame}");
        }
        assert!(cache.len() <= 6);
    }

    /// Test: far cue cancels queued work
    /// Validates: jobs for frames outside the new window neither decode nor publish
    #[test]
    fn test_far_cue_cancels_prefetch() {
        let slow = SyntheticStream::new("slow", 1000).with_latency(Duration::from_millis(5));
        let (timeline, stream) = single_stream(slow);
        let cache = TextureCache::new(
            Arc::clone(&timeline),
            CacheConfig {
                workers: 1,
                ..config(200, 100)
            },
            Arc::new(MemoryUploader::new()),
        )
        .unwrap();

        cache.prepare(0, IterationMode::Forward);
        cache.prepare(800, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));

        for frame in 800..=900 {
            assert!(cache.contains(&at(&stream, frame)), "frame {frame}");
        }
        // A single worker had at most a couple of old jobs started at the cue
        let started_before_cue = stream.decode_count() - 101;
        assert!(started_before_cue <= 3, "{started_before_cue} old frames decoded");
        let old_resident = (0..=100).filter(|&f| cache.contains(&at(&stream, f))).count();
        assert!(old_resident <= started_before_cue);
        assert!((3..=100).all(|f| !cache.contains(&at(&stream, f))));
        assert!(cache.stats().cancelled() >= 98);
    }

    /// Test: prepare is non-blocking
    /// Validates: queuing a window of slow decodes returns well under one decode
    #[test]
    fn test_prepare_does_not_wait_for_decode() {
        let slow = SyntheticStream::new("slow", 100).with_latency(Duration::from_millis(50));
        let (timeline, stream) = single_stream(slow);
        let cache = cache(&timeline, 20, 10);

        let start = Instant::now();
        cache.prepare(0, IterationMode::Forward);
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(25), "prepare took {elapsed:?}");

        // Queries miss immediately instead of waiting for the workers
        let start = Instant::now();
        assert!(cache.get_loaded_texture(&at(&stream, 10)).is_none());
        assert!(start.elapsed() < Duration::from_millis(25));
        assert!(cache.in_flight() > 0);
        assert!(cache.wait_idle(IDLE));
    }

    /// Test: window wider than the cache
    /// Validates: capacity=4, K=10 keeps the frames right after the playhead
    #[test]
    fn test_window_wider_than_capacity() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 200));
        let cache = TextureCache::new(
            Arc::clone(&timeline),
            CacheConfig {
                workers: 1,
                ..config(4, 10)
            },
            Arc::new(MemoryUploader::new()),
        )
        .unwrap();

        for frame in 50..70 {
            cache.prepare(frame, IterationMode::Forward);
            assert!(cache.wait_idle(IDLE));
            for next in frame..frame + 4 {
                assert!(cache.contains(&at(&stream, next)), "frame {next} after prepare({frame})");
            }
            assert_eq!(cache.len(), 4);
        }
        // Each step decodes only the one frame that slid into reach
        assert_eq!(stream.decode_count(), 4 + 19);
        assert_eq!(cache.stats().dropped(), 0);
    }

    /// Test: in-window eviction prefers the frame farthest from the playhead
    #[test]
    fn test_evicts_farthest_in_window() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 200));
        let cache = cache(&timeline, 3, 10);

        cache.prepare(50, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        for frame in 50..=52 {
            assert!(cache.contains(&at(&stream, frame)));
        }

        // Step back: 50..52 are still in the window, 51 and 52 are the farthest
        cache.prepare(48, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        for frame in 48..=50 {
            assert!(cache.contains(&at(&stream, frame)), "frame {frame}");
        }
        assert!(!cache.contains(&at(&stream, 52)));
        assert_eq!(cache.stats().evictions(), 2);

        // A late texture farther than everything resident is discarded
        let image = stream.decode(58).unwrap();
        let texture = MemoryUploader::new().upload(image).unwrap();
        cache.shared.publish(LoadedTexture::new(at(&stream, 58), texture));
        assert!(!cache.contains(&at(&stream, 58)));
        assert_eq!(cache.stats().dropped(), 1);
        assert_eq!(cache.len(), 3);
    }

    /// Test: a decode that finishes after its frame left the window
    /// Validates: not published, nothing in the window evicted for it
    #[test]
    fn test_stale_publish_is_cancelled() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 200));
        let cache = cache(&timeline, 4, 3);
        cache.prepare(10, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        let cancelled = cache.stats().cancelled();

        let image = stream.decode(90).unwrap();
        let texture = MemoryUploader::new().upload(image).unwrap();
        cache.shared.publish(LoadedTexture::new(at(&stream, 90), texture));

        assert!(!cache.contains(&at(&stream, 90)));
        for frame in 10..=13 {
            assert!(cache.contains(&at(&stream, frame)), "frame {frame}");
        }
        assert_eq!(cache.stats().evictions(), 0);
        assert_eq!(cache.stats().cancelled(), cancelled + 1);
    }

    /// Test: repeated prepares while loads finish
    /// Validates: a frame is never decoded twice or replaced
    #[test]
    fn test_no_duplicate_loads() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 64));
        let cache = TextureCache::new(
            Arc::clone(&timeline),
            CacheConfig {
                workers: 4,
                ..config(64, 63)
            },
            Arc::new(MemoryUploader::new()),
        )
        .unwrap();

        for _ in 0..200 {
            cache.prepare(0, IterationMode::Forward);
        }
        assert!(cache.wait_idle(IDLE));

        assert_eq!(cache.len(), 64);
        assert_eq!(stream.decode_count(), 64);
        assert_eq!(cache.stats().published(), 64);
    }

    /// Test: failing frame is a standing miss with backoff
    /// Validates: no retry on every prepare, retry after backoff
    #[test]
    fn test_failed_decode_backs_off() {
        let (timeline, stream) = single_stream(SyntheticStream::new("bad", 50).with_failing([10]));
        let cache = cache(&timeline, 10, 0);
        let r = at(&stream, 10);

        cache.prepare(10, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        assert_eq!(cache.failure_attempts(&r), 1);

        for _ in 0..20 {
            cache.prepare(10, IterationMode::Forward);
            assert!(cache.get_loaded_texture(&r).is_none());
        }
        assert!(cache.wait_idle(IDLE));
        assert_eq!(stream.decode_count(), 1);
        assert_eq!(cache.snapshot().backing_off, 1);

        std::thread::sleep(Duration::from_millis(250));
        cache.prepare(10, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        assert_eq!(stream.decode_count(), 2);
        assert_eq!(cache.failure_attempts(&r), 2);
        assert_eq!(cache.stats().failures(), 2);
    }

    /// Test: paused policy
    /// Validates: CurrentFrame suspends look-ahead, PingPong loads both sides
    #[test]
    fn test_paused_prefetch_policies() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 100));

        let both = cache(&timeline, 20, 4);
        both.prepare(50, IterationMode::PingPong);
        assert!(both.wait_idle(IDLE));
        for frame in 48..=52 {
            assert!(both.contains(&at(&stream, frame)), "frame {frame}");
        }

        let current = TextureCache::new(
            Arc::clone(&timeline),
            CacheConfig {
                paused_prefetch: PausedPrefetch::CurrentFrame,
                ..config(20, 4)
            },
            Arc::new(MemoryUploader::new()),
        )
        .unwrap();
        current.prepare(50, IterationMode::PingPong);
        assert!(current.wait_idle(IDLE));
        assert_eq!(current.len(), 1);
        assert!(current.contains(&at(&stream, 50)));

        // Policy only applies to paused playback
        current.prepare(50, IterationMode::Forward);
        assert!(current.wait_idle(IDLE));
        assert_eq!(current.len(), 5);
    }

    /// Test: timeline change invalidates unreachable entries
    #[test]
    fn test_set_timeline_invalidates() {
        let (timeline, stream) = single_stream(SyntheticStream::new("seq", 100));
        let cache = cache(&timeline, 20, 5);
        cache.prepare(10, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        assert_eq!(cache.len(), 6);

        // New cut only uses source frames 12..20
        let shared: Arc<dyn MediaStream> = stream.clone();
        let track = Track::new("v1")
            .with_clip(0, Clip::new(shared, 8).with_offset(12))
            .unwrap();
        cache.set_timeline(Arc::new(Timeline::new().with_track(track)));

        assert_eq!(cache.len(), 4);
        assert!(cache.contains(&at(&stream, 12)));
        assert!(!cache.contains(&at(&stream, 11)));
        assert!(cache.window().is_none());
        assert_eq!(
            cache.snapshot().resident_bytes,
            4 * 16 * 9 * 4,
            "freed bytes of invalidated entries"
        );
    }

    /// Test: multiple tracks share one window
    #[test]
    fn test_multi_track_window() {
        let a = Arc::new(SyntheticStream::new("a", 100));
        let b = Arc::new(SyntheticStream::new("b", 100));
        let mut muted = Track::new("muted").with_clip(0, Clip::new(b.clone(), 100)).unwrap();
        muted.disabled = true;
        let timeline = Arc::new(
            Timeline::new()
                .with_track(Track::new("v1").with_clip(0, Clip::new(a.clone(), 100)).unwrap())
                .with_track(muted),
        );
        let cache = cache(&timeline, 20, 3);
        cache.prepare(5, IterationMode::Backward);
        assert!(cache.wait_idle(IDLE));

        for frame in 2..=5 {
            assert!(cache.contains(&at(&a, frame)));
            assert!(!cache.contains(&at(&b, frame)));
        }
    }

    /// Test: diagnostics under concurrent load
    /// Validates: occupancy stays within [0, capacity] while workers publish
    #[test]
    fn test_dump_state_concurrent() {
        let (timeline, _) = single_stream(SyntheticStream::new("seq", 500));
        let cache = Arc::new(cache(&timeline, 12, 10));

        let reader = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                let mut state = CacheState::default();
                for _ in 0..500 {
                    cache.dump_state(&mut state);
                    assert!(state.occupancy <= state.capacity);
                    assert!(state.in_flight <= 500);
                }
            })
        };

        for frame in (0..400).step_by(7) {
            cache.prepare(frame, IterationMode::Forward);
        }
        reader.join().unwrap();
        assert!(cache.wait_idle(IDLE));
        assert!(cache.len() <= 12);
    }

    #[test]
    fn test_clear() {
        let (timeline, _) = single_stream(SyntheticStream::new("seq", 20));
        let cache = cache(&timeline, 20, 5);
        cache.prepare(0, IterationMode::Forward);
        assert!(cache.wait_idle(IDLE));
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.snapshot().resident_bytes, 0);
    }
}
