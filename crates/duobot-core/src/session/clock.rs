//! Time sources for session activity tracking

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Supplies non-decreasing timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never reports a time earlier than one it already
/// returned, even if the system clock is stepped back
#[derive(Debug, Default)]
pub struct SystemClock {
    last_micros: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let micros = wall.timestamp_micros();
        let previous = self.last_micros.fetch_max(micros, Ordering::AcqRel);
        if previous > micros {
            DateTime::from_timestamp_micros(previous).unwrap_or(wall)
        } else {
            wall
        }
    }
}

/// Manually driven clock for deterministic tests and benchmarks
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start the clock at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = current.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Jump to `at`. Earlier instants are ignored so the clock stays
    /// non-decreasing.
    pub fn set(&self, at: DateTime<Utc>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if at > *current {
            *current = at;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_non_decreasing() {
        let clock = SystemClock::new();
        let mut previous = clock.now();
        for _ in 0..1000 {
            let now = clock.now();
            assert!(now >= previous);
            previous = now;
        }
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::from_secs(15));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(15));
    }

    #[test]
    fn test_manual_clock_set_ignores_past() {
        let clock = ManualClock::default();
        clock.advance(Duration::from_secs(10));
        let now = clock.now();
        clock.set(DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(clock.now(), now);
    }
}
