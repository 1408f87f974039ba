//! Cache counters and the diagnostic snapshot
//!
//! Counters are relaxed atomics bumped from the control thread (hits/misses)
//! and from workers (publish, evict, cancel, failure). They are approximate
//! with respect to each other, which is fine for a stats overlay.
//!
//! Resident bytes are tracked with a saturating decrement so a racing
//! replace/evict can never wrap the gauge.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::window::PrefetchWindow;

/// Live counters shared between the cache and its workers
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    scheduled: AtomicU64,
    published: AtomicU64,
    evictions: AtomicU64,
    cancelled: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
    resident_bytes: AtomicUsize,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Decoded texture discarded because nothing was evictable
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn add_bytes(&self, bytes: usize) {
        self.resident_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Saturating subtraction (compare-exchange loop) so the gauge never wraps
    pub fn free_bytes(&self, bytes: usize) {
        loop {
            let current = self.resident_bytes.load(Ordering::Relaxed);
            let new_val = current.saturating_sub(bytes);
            if self
                .resident_bytes
                .compare_exchange_weak(current, new_val, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes.load(Ordering::Relaxed)
    }

    /// Copy counters into `state`.
    pub fn fill(&self, state: &mut CacheState) {
        state.hits = self.hits();
        state.misses = self.misses();
        state.scheduled = self.scheduled.load(Ordering::Relaxed);
        state.published = self.published.load(Ordering::Relaxed);
        state.evictions = self.evictions();
        state.cancelled = self.cancelled();
        state.dropped = self.dropped.load(Ordering::Relaxed);
        state.failures = self.failures();
        state.resident_bytes = self.resident_bytes();
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.scheduled,
            &self.published,
            &self.evictions,
            &self.cancelled,
            &self.dropped,
            &self.failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time diagnostic snapshot of a texture cache.
///
/// Meant to be reused across polls: `TextureCache::dump_state` overwrites
/// every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheState {
    pub occupancy: usize,
    pub capacity: usize,
    pub in_flight: usize,
    pub backing_off: usize,
    pub resident_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub scheduled: u64,
    pub published: u64,
    pub evictions: u64,
    pub cancelled: u64,
    pub dropped: u64,
    pub failures: u64,
    pub window: Option<PrefetchWindow>,
}

impl CacheState {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    /// Occupancy as a fraction of capacity (0.0-1.0)
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.occupancy as f64 / self.capacity as f64
        }
    }

    /// One-line summary for a stats overlay or log.
    pub fn summary(&self) -> String {
        let window = match &self.window {
            Some(w) => format!("[{}..{}] {}", w.first, w.last, w.mode),
            None => "-".to_string(),
        };
        format!(
            "cache {}/{} ({} KB) in-flight {} hit {:.1}% evict {} cancel {} fail {} window {}",
            self.occupancy,
            self.capacity,
            self.resident_bytes / 1024,
            self.in_flight,
            self.hit_rate() * 100.0,
            self.evictions,
            self.cancelled,
            self.failures,
            window
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_fill_snapshot() {
        let counters = CacheCounters::new();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        counters.record_eviction();
        counters.add_bytes(4096);

        let mut state = CacheState::default();
        counters.fill(&mut state);
        assert_eq!((state.hits, state.misses, state.evictions), (2, 1, 1));
        assert_eq!(state.resident_bytes, 4096);
        assert!((state.hit_rate() - 2.0 / 3.0).abs() < 1e-9);

        counters.reset();
        counters.fill(&mut state);
        assert_eq!((state.hits, state.misses), (0, 0));
        // Gauge is not a counter, reset leaves it alone
        assert_eq!(state.resident_bytes, 4096);
    }

    #[test]
    fn test_free_bytes_saturates() {
        let counters = CacheCounters::new();
        counters.add_bytes(100);
        counters.free_bytes(250);
        assert_eq!(counters.resident_bytes(), 0);
    }

    #[test]
    fn test_summary_and_ratios() {
        let state = CacheState {
            occupancy: 5,
            capacity: 10,
            ..CacheState::default()
        };
        assert_eq!(state.fill_ratio(), 0.5);
        assert_eq!(state.hit_rate(), 0.0);
        assert!(state.summary().starts_with("cache 5/10"));
    }
}
