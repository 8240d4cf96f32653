//! Connection state machine for one target.

use std::sync::Arc;

use docbridge_shared::{BridgeError, ConnectionState, ConnectionStatus, Credentials};

use crate::events::{BridgeEvent, NoticeLevel};
use crate::provider::{DocumentProvider, HandshakeOutcome};
use crate::services::CoreServices;
use crate::timeout::{with_timeout, with_timeout_notify};

pub struct ConnectionManager {
    target: String,
    provider: Arc<dyn DocumentProvider>,
    services: CoreServices,
}

impl ConnectionManager {
    pub fn new(target: impl Into<String>, provider: Arc<dyn DocumentProvider>, services: CoreServices) -> Self {
        Self {
            target: target.into(),
            provider,
            services,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn provider(&self) -> &Arc<dyn DocumentProvider> {
        &self.provider
    }

    pub fn services(&self) -> &CoreServices {
        &self.services
    }

    pub fn state(&self) -> ConnectionState {
        self.services.connections.state(&self.target)
    }

    /// Connect with a credential pair.
    ///
    /// Guards run in order: blank credentials, an attempt already in flight,
    /// an open circuit. None of them touch the network or the store.
    pub async fn connect(&self, client_id: &str, api_key: &str) -> Result<(), BridgeError> {
        self.services.connections.rearm_auto_reconnect(&self.target);
        self.run_connect(client_id, api_key).await
    }

    async fn run_connect(&self, client_id: &str, api_key: &str) -> Result<(), BridgeError> {
        let result = self.try_connect(client_id, api_key).await;
        if let Err(err) = &result {
            if !matches!(err, BridgeError::Superseded) {
                self.services.events.emit(BridgeEvent::ConnectionFailed {
                    target: self.target.clone(),
                    kind: err.kind(),
                    message: err.user_message(),
                });
            }
        }
        result
    }

    async fn try_connect(&self, client_id: &str, api_key: &str) -> Result<(), BridgeError> {
        let credentials = Credentials::new(client_id.trim(), api_key.trim());
        if !credentials.is_complete() {
            return Err(BridgeError::Validation(
                "Client ID and API key are both required.".to_string(),
            ));
        }

        let services = &self.services;
        let target = self.target.as_str();

        if services.connections.is_in_flight(target) {
            crate::log_debug!("Connect for '{}' rejected: attempt in flight", target);
            return Err(BridgeError::Busy {
                target: target.to_string(),
            });
        }

        if !services.breakers.can_execute(target) {
            let status = services.breakers.status(target);
            return Err(BridgeError::CircuitOpen {
                target: target.to_string(),
                failures: status.failures,
                retry_after_ms: status.retry_after_ms.unwrap_or_default(),
            });
        }

        let connect_timeout = services.config.connect_timeout;
        let now = services.clock.now();
        let deadline = now
            + chrono::Duration::from_std(connect_timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let attempt_id = services
            .connections
            .begin_attempt(target, credentials.clone(), deadline, now)?;

        // Saved before the handshake so a retry after a crash can reuse them.
        if let Err(e) = services
            .storage
            .persistent
            .save(&services.keys.credentials(target), &credentials)
        {
            crate::log_warn!("Could not persist credentials for '{}': {}", target, e);
        }

        let cached_token: Option<String> = services
            .storage
            .persistent
            .load(&services.keys.session_token(target));

        let handshake = {
            let provider = Arc::clone(&self.provider);
            let connections = Arc::clone(&services.connections);
            let target = target.to_string();
            async move {
                if !provider.is_api_loaded() {
                    provider.reload_client_library().await?;
                }
                let outcome = provider.connect(&credentials, cached_token.as_deref()).await;
                if !connections.is_live(&target, attempt_id) {
                    crate::log_info!(
                        "Discarding late handshake result for '{}' (attempt {})",
                        target,
                        attempt_id
                    );
                }
                outcome
            }
        };

        let result = with_timeout_notify(handshake, connect_timeout, "provider handshake", |err| {
            crate::log_warn!("Attempt {} for '{}': {}", attempt_id, target, err);
        })
        .await;

        let outcome: Result<HandshakeOutcome, BridgeError> = match result {
            Ok(Ok(handshake)) if handshake.connected => Ok(handshake),
            Ok(Ok(_)) => Err(BridgeError::TransientNetwork(
                "The document provider refused the connection.".to_string(),
            )),
            Ok(Err(provider_err)) => Err(BridgeError::from_provider(&provider_err)),
            Err(timeout) => Err(BridgeError::Timeout {
                operation: timeout.description.clone(),
                after_ms: timeout.after_ms(),
            }),
        };

        let recorded = services.connections.complete_attempt(
            target,
            attempt_id,
            outcome.as_ref().map(|_| ()).map_err(|e| e.clone()),
        );
        if !recorded {
            crate::log_info!("Attempt {} for '{}' was superseded", attempt_id, target);
            return Err(BridgeError::Superseded);
        }

        match outcome {
            Ok(handshake) => {
                services.breakers.on_success(target);
                self.persist_session(handshake.session_token.as_deref());
                Ok(())
            }
            Err(err) => {
                if err.kind().charges_breaker() {
                    services.breakers.on_failure(target);
                }
                if matches!(err, BridgeError::Auth(_)) {
                    // The cached token is what the provider just refused.
                    self.remove_persisted(&services.keys.session_token(target));
                }
                crate::log_warn!("Connect for '{}' failed ({}): {}", target, err.kind().as_str(), err);
                Err(err)
            }
        }
    }

    fn persist_session(&self, token: Option<&str>) {
        let keys = &self.services.keys;
        let persistent = &self.services.storage.persistent;
        if let Err(e) = persistent.save(&keys.connected_marker(&self.target), &true) {
            crate::log_warn!("Could not persist connected marker for '{}': {}", self.target, e);
        }
        if let Some(token) = token {
            if let Err(e) = persistent.save(&keys.session_token(&self.target), &token) {
                crate::log_warn!("Could not persist session token for '{}': {}", self.target, e);
            }
        }
    }

    fn remove_persisted(&self, key: &str) -> bool {
        match self.services.storage.persistent.remove(key) {
            Ok(()) => true,
            Err(e) => {
                crate::log_warn!("Could not remove '{}': {}", key, e);
                false
            }
        }
    }

    /// Back to `Disconnected`, keeping the saved credential pair.
    ///
    /// Never fails; internal errors become warning notices.
    pub async fn reset(&self) {
        let services = &self.services;
        let target = self.target.as_str();

        services.connections.reset(target);
        services.breakers.reset(target);

        let mut clean = self.remove_persisted(&services.keys.connected_marker(target));
        clean &= self.remove_persisted(&services.keys.session_token(target));
        if !clean {
            services
                .events
                .notice(NoticeLevel::Warning, "Saved session could not be fully cleared.");
        }

        let timeout = services.config.request_timeout;
        let provider = Arc::clone(&self.provider);
        let teardown = async move {
            provider.reset_connection().await?;
            provider.reload_client_library().await
        };
        let message = match with_timeout(teardown, timeout, "provider reset").await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("Provider reset incomplete: {e}")),
            Err(e) => Some(e.to_string()),
        };
        if let Some(message) = message {
            crate::log_warn!("Reset of '{}': {}", target, message);
            services.events.notice(NoticeLevel::Warning, message);
        }

        crate::log_info!("Connection '{}' reset", target);
    }

    pub fn status(&self) -> ConnectionStatus {
        let snapshot = self.services.connections.snapshot(&self.target);
        ConnectionStatus {
            target: self.target.clone(),
            state: snapshot.state,
            attempts: snapshot.attempts,
            in_flight: snapshot.live_attempt.is_some(),
            attempt_started_at: snapshot.live_attempt.as_ref().map(|a| a.started_at),
            attempt_deadline: snapshot.live_attempt.as_ref().map(|a| a.deadline),
            breaker: self.services.breakers.status(&self.target),
            last_error: snapshot.last_error.map(|e| e.to_string()),
            has_saved_credentials: self.saved_credentials().is_some(),
        }
    }

    pub fn saved_credentials(&self) -> Option<Credentials> {
        self.services
            .storage
            .persistent
            .load::<Credentials>(&self.services.keys.credentials(&self.target))
            .filter(Credentials::is_complete)
    }

    pub fn has_cached_token(&self) -> bool {
        self.services
            .storage
            .persistent
            .exists(&self.services.keys.session_token(&self.target))
    }

    /// Seed the store from durable storage after a restart.
    pub fn restore(&self) -> ConnectionState {
        let credentials = self.saved_credentials();
        let marker = self
            .services
            .storage
            .persistent
            .load::<bool>(&self.services.keys.connected_marker(&self.target))
            .unwrap_or(false);

        let state = if marker && credentials.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        self.services.connections.seed(&self.target, state, credentials);
        crate::log_info!("Restored '{}' as {}", self.target, state);
        state
    }

    /// One extra connect attempt when the store believes `Connected` but the
    /// last attempt did not succeed, given saved credentials and a cached
    /// token. Fires at most once until the next restore, reset or explicit
    /// connect. Returns `None` when the conditions don't hold.
    pub async fn maybe_auto_reconnect(&self) -> Option<Result<(), BridgeError>> {
        let snapshot = self.services.connections.snapshot(&self.target);
        if snapshot.state != ConnectionState::Connected
            || snapshot.last_result == Some(true)
            || snapshot.live_attempt.is_some()
            || !self.has_cached_token()
        {
            return None;
        }
        let credentials = self.saved_credentials()?;
        if !self.services.connections.claim_auto_reconnect(&self.target) {
            return None;
        }

        crate::log_info!("Auto-reconnecting '{}'", self.target);
        Some(self.run_connect(&credentials.client_id, &credentials.api_key).await)
    }

    /// Align the store with the provider's own view. Returns whether it changed.
    pub fn correct_state(&self, believed: ConnectionState, actual: ConnectionState) -> bool {
        let changed = self
            .services
            .connections
            .correct(&self.target, believed, actual);
        if !changed {
            return false;
        }

        let marker = self.services.keys.connected_marker(&self.target);
        if actual == ConnectionState::Connected {
            if let Err(e) = self.services.storage.persistent.save(&marker, &true) {
                crate::log_warn!("Could not persist connected marker for '{}': {}", self.target, e);
            }
        } else {
            self.remove_persisted(&marker);
        }
        true
    }
}
