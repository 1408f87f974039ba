//! Decode failure bookkeeping
//!
//! A frame that fails to decode becomes a standing miss. Prefetch skips it
//! until its backoff expires; each further failure doubles the delay up to a
//! cap. A later successful decode clears the record.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::entities::clip::MediaFrameReference;

#[derive(Debug, Clone, Copy)]
struct Failure {
    attempts: u32,
    retry_at: Instant,
}

#[derive(Debug)]
pub struct FailureLog {
    entries: Mutex<HashMap<MediaFrameReference, Failure>>,
    base: Duration,
    max: Duration,
}

impl FailureLog {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            base,
            max: max.max(base),
        }
    }

    /// Record a failed decode at `now`. Returns the delay before the next attempt.
    pub fn record(&self, reference: MediaFrameReference, now: Instant) -> Duration {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let attempts = entries.get(&reference).map_or(0, |f| f.attempts) + 1;
        let delay = self.delay_for(attempts);
        entries.insert(
            reference,
            Failure {
                attempts,
                retry_at: now + delay,
            },
        );
        delay
    }

    fn delay_for(&self, attempts: u32) -> Duration {
        // base * 2^(attempts-1), capped
        let shift = attempts.saturating_sub(1).min(20);
        self.base.saturating_mul(1u32 << shift).min(self.max)
    }

    pub fn clear(&self, reference: &MediaFrameReference) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(reference);
    }

    /// Whether `reference` must not be retried yet.
    pub fn is_backing_off(&self, reference: &MediaFrameReference, now: Instant) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .is_some_and(|f| f.retry_at > now)
    }

    pub fn attempts(&self, reference: &MediaFrameReference) -> u32 {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(reference)
            .map_or(0, |f| f.attempts)
    }

    pub fn backing_off_count(&self, now: Instant) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|f| f.retry_at > now)
            .count()
    }

    /// Drop records for references that no longer matter.
    pub fn retain(&self, mut keep: impl FnMut(&MediaFrameReference) -> bool) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|r, _| keep(r));
    }

    pub fn clear_all(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::media::StreamId;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let log = FailureLog::new(Duration::from_millis(100), Duration::from_millis(350));
        let r = MediaFrameReference::new(StreamId::new(), 7);
        let now = Instant::now();

        assert_eq!(log.record(r, now), Duration::from_millis(100));
        assert_eq!(log.record(r, now), Duration::from_millis(200));
        assert_eq!(log.record(r, now), Duration::from_millis(350));
        assert_eq!(log.record(r, now), Duration::from_millis(350));
        assert_eq!(log.attempts(&r), 4);
    }

    #[test]
    fn test_backing_off_window() {
        let log = FailureLog::new(Duration::from_millis(100), Duration::from_secs(1));
        let r = MediaFrameReference::new(StreamId::new(), 1);
        let now = Instant::now();

        assert!(!log.is_backing_off(&r, now));
        log.record(r, now);
        assert!(log.is_backing_off(&r, now));
        assert!(log.is_backing_off(&r, now + Duration::from_millis(99)));
        assert!(!log.is_backing_off(&r, now + Duration::from_millis(100)));
        assert_eq!(log.backing_off_count(now), 1);

        log.clear(&r);
        assert!(!log.is_backing_off(&r, now));
        assert_eq!(log.attempts(&r), 0);
    }
}
