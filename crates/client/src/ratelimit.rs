//! Anti-bounce limiter for refresh-style network calls.
//!
//! Tracks the last *successful* call per key; a new call is suppressed while
//! that success is younger than the minimum interval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::clock::{elapsed_since, Clock};

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    last_success: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            last_success: Mutex::new(HashMap::new()),
        }
    }

    /// Time left before `key` may hit the network again.
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        let last = *self.last_success.lock().get(key)?;
        let elapsed = elapsed_since(self.clock.now(), last);
        (elapsed < self.min_interval).then(|| self.min_interval - elapsed)
    }

    pub fn allows(&self, key: &str) -> bool {
        self.remaining(key).is_none()
    }

    pub fn record_success(&self, key: &str) {
        self.last_success
            .lock()
            .insert(key.to_string(), self.clock.now());
    }

    pub fn reset(&self) {
        self.last_success.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn suppresses_within_window_per_key() {
        let clock = ManualClock::default();
        let limiter = RateLimiter::new(Duration::from_secs(2), Arc::new(clock.clone()));

        assert!(limiter.allows("folderA"));
        limiter.record_success("folderA");
        assert!(!limiter.allows("folderA"));
        assert!(limiter.allows("folderB"));

        clock.advance(Duration::from_millis(1_500));
        assert_eq!(limiter.remaining("folderA"), Some(Duration::from_millis(500)));

        clock.advance(Duration::from_millis(500));
        assert!(limiter.allows("folderA"));
    }

    #[test]
    fn reset_forgets_history() {
        let clock = ManualClock::default();
        let limiter = RateLimiter::new(Duration::from_secs(2), Arc::new(clock));
        limiter.record_success("root");
        limiter.reset();
        assert!(limiter.allows("root"));
    }
}
