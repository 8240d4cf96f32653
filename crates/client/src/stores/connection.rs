//! Connection store: the single source of truth for per-target connection state.
//!
//! Every transition goes through here. An attempt is identified by an
//! [`AttemptId`]; only the attempt that is still live for its target may
//! write a result back, so late completions after a reset or a newer attempt
//! are dropped instead of overwriting fresher state.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use docbridge_shared::{BridgeError, ConnectionState, Credentials};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::events::{BridgeEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptId(Uuid);

impl AttemptId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An in-flight handshake. At most one exists per target.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub attempt_id: AttemptId,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub credentials: Credentials,
}

/// What the store knows about one target.
#[derive(Debug, Clone, Default)]
pub struct TargetConnection {
    pub state: ConnectionState,
    pub live_attempt: Option<ConnectionAttempt>,
    /// Attempts since the last reset.
    pub attempts: u32,
    /// Outcome of the most recent completed attempt.
    pub last_result: Option<bool>,
    pub last_error: Option<BridgeError>,
    pub credentials: Option<Credentials>,
    /// Set once auto-reconnect has fired, or once sync found the provider
    /// connected on its own. Cleared by restore, reset and explicit connects.
    pub auto_reconnect_spent: bool,
}

#[derive(Debug)]
pub struct ConnectionStore {
    targets: Mutex<HashMap<String, TargetConnection>>,
    events: EventBus,
}

impl ConnectionStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            targets: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn snapshot(&self, target: &str) -> TargetConnection {
        self.targets.lock().get(target).cloned().unwrap_or_default()
    }

    pub fn state(&self, target: &str) -> ConnectionState {
        self.targets
            .lock()
            .get(target)
            .map(|t| t.state)
            .unwrap_or_default()
    }

    pub fn is_in_flight(&self, target: &str) -> bool {
        self.targets
            .lock()
            .get(target)
            .is_some_and(|t| t.live_attempt.is_some())
    }

    pub fn is_live(&self, target: &str, attempt_id: AttemptId) -> bool {
        self.targets
            .lock()
            .get(target)
            .and_then(|t| t.live_attempt.as_ref())
            .is_some_and(|a| a.attempt_id == attempt_id)
    }

    /// Register a new attempt and move the target to `Connecting`.
    ///
    /// Fails with `Busy` while another attempt for the target is live. The
    /// check and the registration happen under one lock.
    pub fn begin_attempt(
        &self,
        target: &str,
        credentials: Credentials,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<AttemptId, BridgeError> {
        let (attempt_id, previous) = {
            let mut targets = self.targets.lock();
            let entry = targets.entry(target.to_string()).or_default();
            if entry.live_attempt.is_some() {
                return Err(BridgeError::Busy {
                    target: target.to_string(),
                });
            }

            let attempt_id = AttemptId::new();
            entry.live_attempt = Some(ConnectionAttempt {
                attempt_id,
                started_at: now,
                deadline,
                credentials: credentials.clone(),
            });
            entry.attempts = entry.attempts.saturating_add(1);
            entry.credentials = Some(credentials);
            let previous = entry.state;
            entry.state = ConnectionState::Connecting;
            (attempt_id, previous)
        };

        crate::log_debug!("Attempt {} started for '{}'", attempt_id, target);
        self.publish_change(target, previous, ConnectionState::Connecting);
        Ok(attempt_id)
    }

    /// Record the outcome of `attempt_id`.
    ///
    /// Returns `false` and changes nothing if the attempt is no longer live.
    pub fn complete_attempt(
        &self,
        target: &str,
        attempt_id: AttemptId,
        outcome: Result<(), BridgeError>,
    ) -> bool {
        let (previous, current) = {
            let mut targets = self.targets.lock();
            let Some(entry) = targets.get_mut(target) else {
                return false;
            };
            if entry.live_attempt.as_ref().map(|a| a.attempt_id) != Some(attempt_id) {
                return false;
            }

            entry.live_attempt = None;
            let previous = entry.state;
            match outcome {
                Ok(()) => {
                    entry.state = ConnectionState::Connected;
                    entry.last_result = Some(true);
                    entry.last_error = None;
                }
                Err(err) => {
                    entry.state = ConnectionState::Error;
                    entry.last_result = Some(false);
                    entry.last_error = Some(err);
                }
            }
            (previous, entry.state)
        };

        self.publish_change(target, previous, current);
        true
    }

    /// Move `target` from `believed` to `actual`, unless an attempt is in
    /// flight or the state already moved on. Returns whether it changed.
    pub fn correct(&self, target: &str, believed: ConnectionState, actual: ConnectionState) -> bool {
        {
            let mut targets = self.targets.lock();
            let entry = targets.entry(target.to_string()).or_default();
            if entry.live_attempt.is_some() || entry.state != believed || believed == actual {
                return false;
            }
            entry.state = actual;
            if actual == ConnectionState::Connected {
                // The provider's session is alive; reconnecting would only churn it.
                entry.auto_reconnect_spent = true;
            }
        }

        self.publish_change(target, believed, actual);
        true
    }

    /// Take the single auto-reconnect allowed per restore. Returns `false` if
    /// it was already taken.
    pub fn claim_auto_reconnect(&self, target: &str) -> bool {
        let mut targets = self.targets.lock();
        let entry = targets.entry(target.to_string()).or_default();
        !std::mem::replace(&mut entry.auto_reconnect_spent, true)
    }

    /// Re-allow auto-reconnect after the user connects explicitly.
    pub fn rearm_auto_reconnect(&self, target: &str) {
        if let Some(entry) = self.targets.lock().get_mut(target) {
            entry.auto_reconnect_spent = false;
        }
    }

    /// Load persisted state after a restart. Ignored while an attempt is live.
    pub fn seed(&self, target: &str, state: ConnectionState, credentials: Option<Credentials>) {
        let previous = {
            let mut targets = self.targets.lock();
            let entry = targets.entry(target.to_string()).or_default();
            if entry.live_attempt.is_some() {
                return;
            }
            let previous = entry.state;
            entry.state = state;
            entry.auto_reconnect_spent = false;
            if credentials.is_some() {
                entry.credentials = credentials;
            }
            previous
        };

        self.publish_change(target, previous, state);
    }

    /// Back to `Disconnected`. Any live attempt is invalidated; saved
    /// credentials stay so the user can reconnect.
    pub fn reset(&self, target: &str) {
        let previous = {
            let mut targets = self.targets.lock();
            let entry = targets.entry(target.to_string()).or_default();
            if let Some(attempt) = entry.live_attempt.take() {
                crate::log_info!(
                    "Invalidated attempt {} for '{}' on reset",
                    attempt.attempt_id,
                    target
                );
            }
            let previous = entry.state;
            let credentials = entry.credentials.take();
            *entry = TargetConnection {
                credentials,
                ..TargetConnection::default()
            };
            previous
        };

        self.publish_change(target, previous, ConnectionState::Disconnected);
    }

    fn publish_change(&self, target: &str, previous: ConnectionState, current: ConnectionState) {
        if previous == current {
            return;
        }
        crate::log_info!("Connection '{}': {} -> {}", target, previous, current);
        self.events.emit(BridgeEvent::ConnectionStatusChanged {
            target: target.to_string(),
            previous,
            current,
        });
    }
}
