//! Background reconciliation between the store and the provider's own signal.

use std::sync::Arc;
use std::time::Duration;

use docbridge_shared::ConnectionState;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ConnectionManager;
use crate::timeout::with_timeout;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    InSync,
    MarkedDisconnected,
    MarkedConnected,
    /// Attempt in flight, or the provider didn't answer in time.
    Skipped,
    /// Auto-reconnect fired; carries whether it succeeded.
    Reconnected(bool),
}

/// One pass: auto-reconnect check, then compare the store against
/// `is_connected` and correct the store if they disagree.
pub async fn reconcile(manager: &ConnectionManager) -> SyncOutcome {
    if let Some(result) = manager.maybe_auto_reconnect().await {
        return SyncOutcome::Reconnected(result.is_ok());
    }

    let services = manager.services();
    if services.connections.is_in_flight(manager.target()) {
        return SyncOutcome::Skipped;
    }
    let believed = manager.state();

    let provider = Arc::clone(manager.provider());
    let actual = match with_timeout(
        async move { provider.is_connected().await },
        services.config.request_timeout,
        "provider status check",
    )
    .await
    {
        Ok(connected) => connected,
        Err(_) => return SyncOutcome::Skipped,
    };

    match (believed, actual) {
        (ConnectionState::Connected, false) => {
            if manager.correct_state(believed, ConnectionState::Disconnected) {
                crate::log_warn!("Provider session for '{}' dropped", manager.target());
                SyncOutcome::MarkedDisconnected
            } else {
                SyncOutcome::Skipped
            }
        }
        (ConnectionState::Disconnected | ConnectionState::Error, true) => {
            if manager.correct_state(believed, ConnectionState::Connected) {
                SyncOutcome::MarkedConnected
            } else {
                SyncOutcome::Skipped
            }
        }
        (ConnectionState::Connecting, _) => SyncOutcome::Skipped,
        _ => SyncOutcome::InSync,
    }
}

/// Owns the polling task. Dropping the handle stops it.
#[derive(Debug)]
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Start polling every `interval`; the first pass runs one interval in.
    pub fn spawn(manager: Arc<ConnectionManager>, interval: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let outcome = reconcile(&manager).await;
                if outcome != SyncOutcome::InSync {
                    crate::log_debug!("Sync '{}': {:?}", manager.target(), outcome);
                }
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
