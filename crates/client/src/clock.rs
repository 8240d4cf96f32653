//! Wall-clock abstraction for TTL, cooldown and anti-bounce decisions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
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

    pub fn advance(&self, by: Duration) {
        if let Ok(delta) = chrono::Duration::from_std(by) {
            *self.now.lock() += delta;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Time elapsed from `earlier` to `now`, saturating at zero.
pub fn elapsed_since(now: DateTime<Utc>, earlier: DateTime<Utc>) -> Duration {
    now.signed_duration_since(earlier).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let start = clock.now();
        let other = clock.clone();

        other.advance(Duration::from_secs(5));

        assert_eq!(elapsed_since(clock.now(), start), Duration::from_secs(5));
    }

    #[test]
    fn elapsed_saturates_when_time_runs_backwards() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(10);
        assert_eq!(elapsed_since(now, later), Duration::ZERO);
    }
}
