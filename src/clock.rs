use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};

/// Source of wall-clock time for playback
///
/// The engine never counts ticks; every remaining-time value is derived from
/// `now()` and the instant the current step started.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests and simulations
///
/// Clones share the same instant, so a test can keep one handle while the
/// engine owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by fractional seconds
    pub fn advance_secs(&self, secs: f64) {
        self.advance(secs_to_delta(secs));
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Seconds between two instants as a float (negative if `later` is earlier)
pub fn secs_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1000.0,
    }
}

/// Convert fractional seconds to a chrono delta at microsecond precision
pub fn secs_to_delta(secs: f64) -> TimeDelta {
    TimeDelta::microseconds((secs * 1_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::default();
        let other = clock.clone();
        let start = clock.now();

        other.advance_secs(2.5);
        assert_eq!(secs_between(start, clock.now()), 2.5);
    }

    #[test]
    fn test_secs_between_negative() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance_secs(-1.0);
        assert_eq!(secs_between(start, clock.now()), -1.0);
    }

    #[test]
    fn test_secs_to_delta() {
        assert_eq!(secs_to_delta(1.5), TimeDelta::milliseconds(1500));
        assert_eq!(secs_to_delta(0.0), TimeDelta::zero());
    }
}
