//! Per-target circuit breakers.
//!
//! ```text
//! closed ──failures >= threshold──▶ open
//! open ──now - last_failure > cooldown (checked on next request)──▶ closed
//! ```
//!
//! The cooldown is evaluated lazily from `now` and `last_failure_at`; no
//! timer is ever scheduled. Once the cooldown elapses one attempt is let
//! through: success resets the count, another failure re-opens the circuit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use docbridge_shared::BreakerStatus;
use parking_lot::Mutex;

use crate::clock::{elapsed_since, Clock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Breakers keyed by target, created lazily and kept for the life of the registry.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, CircuitBreakerState>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    /// Remaining cooldown if the breaker is open right now.
    fn open_for(&self, state: &CircuitBreakerState, now: DateTime<Utc>) -> Option<Duration> {
        if state.failure_count < self.config.threshold {
            return None;
        }
        let last = state.last_failure_at?;
        let elapsed = elapsed_since(now, last);
        if elapsed > self.config.cooldown {
            None
        } else {
            Some(self.config.cooldown - elapsed)
        }
    }

    pub fn can_execute(&self, target: &str) -> bool {
        let now = self.clock.now();
        let mut breakers = self.breakers.lock();
        let state = breakers.entry(target.to_string()).or_default();
        self.open_for(state, now).is_none()
    }

    pub fn on_success(&self, target: &str) {
        let mut breakers = self.breakers.lock();
        let state = breakers.entry(target.to_string()).or_default();
        if state.failure_count > 0 {
            crate::log_info!("Circuit for '{}' closed after success", target);
        }
        *state = CircuitBreakerState::default();
    }

    pub fn on_failure(&self, target: &str) {
        let now = self.clock.now();
        let mut breakers = self.breakers.lock();
        let state = breakers.entry(target.to_string()).or_default();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_at = Some(now);

        if state.failure_count >= self.config.threshold {
            crate::log_warn!(
                "Circuit for '{}' open after {} failures; cooling down for {}ms",
                target,
                state.failure_count,
                self.config.cooldown.as_millis()
            );
        }
    }

    /// Clear the failure count, as an explicit connection reset does.
    pub fn reset(&self, target: &str) {
        self.breakers
            .lock()
            .insert(target.to_string(), CircuitBreakerState::default());
    }

    pub fn status(&self, target: &str) -> BreakerStatus {
        let now = self.clock.now();
        let mut breakers = self.breakers.lock();
        let state = breakers.entry(target.to_string()).or_default();
        let open_for = self.open_for(state, now);
        BreakerStatus {
            failures: state.failure_count,
            is_open: open_for.is_some(),
            retry_after_ms: open_for.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    pub fn state(&self, target: &str) -> CircuitBreakerState {
        self.breakers.lock().get(target).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn registry() -> (BreakerRegistry, ManualClock) {
        let clock = ManualClock::default();
        (
            BreakerRegistry::new(BreakerConfig::default(), Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn opens_at_threshold_and_closes_after_cooldown() {
        let (breakers, clock) = registry();

        for _ in 0..2 {
            breakers.on_failure("qrypto");
            assert!(breakers.can_execute("qrypto"));
        }
        breakers.on_failure("qrypto");
        assert!(!breakers.can_execute("qrypto"));

        clock.advance(Duration::from_secs(30));
        assert!(!breakers.can_execute("qrypto"), "cooldown must be strictly exceeded");

        clock.advance(Duration::from_millis(1));
        assert!(breakers.can_execute("qrypto"));
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let (breakers, clock) = registry();
        for _ in 0..3 {
            breakers.on_failure("qrypto");
        }
        clock.advance(Duration::from_secs(31));
        assert!(breakers.can_execute("qrypto"));

        breakers.on_failure("qrypto");

        assert!(!breakers.can_execute("qrypto"));
        assert_eq!(breakers.status("qrypto").failures, 4);
    }

    #[test]
    fn success_resets_the_count() {
        let (breakers, _clock) = registry();
        breakers.on_failure("qrypto");
        breakers.on_failure("qrypto");
        breakers.on_success("qrypto");
        breakers.on_failure("qrypto");

        assert!(breakers.can_execute("qrypto"));
        assert_eq!(breakers.state("qrypto").failure_count, 1);
    }

    #[test]
    fn targets_are_independent() {
        let (breakers, _clock) = registry();
        for _ in 0..3 {
            breakers.on_failure("qrypto");
        }

        assert!(!breakers.can_execute("qrypto"));
        assert!(breakers.can_execute("default"));
    }

    #[test]
    fn status_reports_remaining_cooldown() {
        let (breakers, clock) = registry();
        for _ in 0..3 {
            breakers.on_failure("qrypto");
        }
        clock.advance(Duration::from_secs(10));

        let status = breakers.status("qrypto");
        assert!(status.is_open);
        assert_eq!(status.failures, 3);
        assert_eq!(status.retry_after_ms, Some(20_000));

        breakers.reset("qrypto");
        assert_eq!(breakers.status("qrypto"), BreakerStatus::default());
    }
}
