//! Tick pacing helpers for the driving loop.
//!
//! - [`Throttle`]: lets an action through at most once per interval
//!   (diagnostics polling, at ≥100ms)
//! - [`Metronome`]: measures the real time between ticks and keeps a rolling
//!   display rate for the stats overlay

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Minimum diagnostics interval
pub const MIN_STATS_INTERVAL: Duration = Duration::from_millis(100);

/// Rate limiter: `ready()` is true at most once per `interval`.
///
/// # Usage
/// ```ignore
/// if throttle.ready(Instant::now()) {
///     cache.dump_state(&mut state);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true (and restarts the interval) if `interval` passed since
    /// the last time it fired. The first call always fires.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Fire on the next `ready` call regardless of the interval.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Samples kept for the rolling rate
const RATE_WINDOW: usize = 60;

/// Tick clock: elapsed time since the previous tick plus a rolling rate.
#[derive(Debug, Clone)]
pub struct Metronome {
    last: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new()
    }
}

impl Metronome {
    pub fn new() -> Self {
        Self {
            last: None,
            intervals: VecDeque::with_capacity(RATE_WINDOW),
        }
    }

    /// Record a tick at `now` and return the time since the previous one
    /// (zero on the first tick).
    pub fn tick(&mut self, now: Instant) -> Duration {
        let elapsed = match self.last {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        if self.last.is_some() {
            if self.intervals.len() == RATE_WINDOW {
                self.intervals.pop_front();
            }
            self.intervals.push_back(elapsed);
        }
        self.last = Some(now);
        elapsed
    }

    /// Average ticks per second over the recent window, 0 until two ticks.
    pub fn rate(&self) -> f64 {
        let total: Duration = self.intervals.iter().sum();
        if total.is_zero() {
            return 0.0;
        }
        self.intervals.len() as f64 / total.as_secs_f64()
    }

    pub fn ticks_sampled(&self) -> usize {
        self.intervals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_interval() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(100));
        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(50)));
        assert!(throttle.ready(start + Duration::from_millis(100)));
        assert!(!throttle.ready(start + Duration::from_millis(199)));
        throttle.reset();
        assert!(throttle.ready(start + Duration::from_millis(199)));
    }

    #[test]
    fn test_metronome_rate() {
        let start = Instant::now();
        let mut metronome = Metronome::new();
        assert_eq!(metronome.tick(start), Duration::ZERO);
        assert_eq!(metronome.rate(), 0.0);
        for i in 1..=10 {
            let elapsed = metronome.tick(start + Duration::from_millis(20 * i));
            assert_eq!(elapsed, Duration::from_millis(20));
        }
        assert!((metronome.rate() - 50.0).abs() < 1e-6);
        assert_eq!(metronome.ticks_sampled(), 10);
    }

    #[test]
    fn test_metronome_window_is_bounded() {
        let start = Instant::now();
        let mut metronome = Metronome::new();
        for i in 0..200 {
            metronome.tick(start + Duration::from_millis(10 * i));
        }
        assert_eq!(metronome.ticks_sampled(), RATE_WINDOW);
    }
}
