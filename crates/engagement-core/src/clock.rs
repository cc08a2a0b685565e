use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Injectable time source.
///
/// spec.md §9's open question notes a mismatch between mocked wall-clock and
/// database-server clock in the source's integration tests; the fix adopted
/// here is to make "now" a trait object the store and engine both read from,
/// so tests can move it deterministically instead of sleeping real time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock — wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock: holds a fixed instant that can be advanced explicitly.
///
/// Cloning shares the same underlying instant (`Arc<Mutex<_>>`), so a single
/// `FixedClock` can be handed to a store, an engine, and a driver in the same
/// test and they will all observe the same advances.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(at)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances_deterministically() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());
        let before = clock.now();
        clock.advance(chrono::Duration::hours(48));
        let after = clock.now();
        assert_eq!(after - before, chrono::Duration::hours(48));
    }

    #[test]
    fn cloned_fixed_clock_shares_state() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());
        let clone = clock.clone();
        clock.advance(chrono::Duration::days(1));
        assert_eq!(clock.now(), clone.now());
    }
}
