mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{services, session, ConnectStep, MockProvider, TARGET};
use docbridge_client::{BridgeEvent, Clock, ManualClock};
use docbridge_shared::{BridgeError, ConnectionState, Credentials, ErrorKind, ProviderError};
use futures_util::future::join_all;
use pretty_assertions::assert_eq;

#[tokio::test(start_paused = true)]
async fn blank_credentials_are_rejected_without_side_effects() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let session = session(&provider, services(&clock));

    let result = session.connect("", "key").await;

    assert!(matches!(result, Err(BridgeError::Validation(_))));
    let status = session.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.breaker.failures, 0);
    assert_eq!(status.attempts, 0);
    assert!(!status.has_saved_credentials);
    assert_eq!(provider.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_start_one_handshake() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    provider.script([ConnectStep::succeed("token-1").after(Duration::from_secs(1))]);
    let session = session(&provider, services(&clock));

    let results = join_all((0..5).map(|_| session.connect("client", "key"))).await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(BridgeError::Busy { .. })))
        .count();
    assert_eq!((ok, busy), (1, 4));
    assert_eq!(provider.connects(), 1);

    let status = session.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn breaker_opens_after_three_failures_and_recovers_after_cooldown() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    provider.script((0..3).map(|_| ConnectStep::fail(ProviderError::Network("connection refused".into()))));
    let session = session(&provider, services(&clock));

    for _ in 0..3 {
        let err = session.connect("client", "key").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert_eq!(err, BridgeError::TransientNetwork("network error: connection refused".into()));
    }

    let err = session.connect("client", "key").await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::CircuitOpen {
            target: TARGET.to_string(),
            failures: 3,
            retry_after_ms: 30_000,
        }
    );
    assert_eq!(provider.connects(), 3);
    assert_eq!(session.status().state, ConnectionState::Error);
    assert_eq!(session.status().attempts, 3);

    clock.advance(Duration::from_secs(31));
    session.connect("client", "key").await.unwrap();

    assert_eq!(provider.connects(), 4);
    let status = session.status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert_eq!(status.breaker.failures, 0);
    assert!(!status.breaker.is_open);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_charged_and_late_success_is_discarded() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    provider.script([ConnectStep::succeed("late").after(Duration::from_secs(60))]);
    let session = session(&provider, services(&clock));

    let err = session.connect("client", "key").await.unwrap_err();

    assert_eq!(
        err,
        BridgeError::Timeout {
            operation: "provider handshake".to_string(),
            after_ms: 30_000,
        }
    );
    assert_eq!(session.status().breaker.failures, 1);
    assert_eq!(session.status().state, ConnectionState::Error);

    // The handshake keeps running and finishes after the deadline.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(provider.session_alive());
    assert_eq!(session.status().state, ConnectionState::Error);
    assert!(!session.status().in_flight);
}

#[tokio::test(start_paused = true)]
async fn result_of_an_attempt_replaced_by_reset_is_discarded() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    provider.script([
        ConnectStep::succeed("slow").after(Duration::from_secs(10)),
        ConnectStep::fail(ProviderError::Network("unreachable".into())).after(Duration::from_secs(1)),
    ]);
    let session = Arc::new(session(&provider, services(&clock)));

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect("client", "key").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(provider.connects(), 1);

    session.reset().await;
    let second = session.connect("client", "key").await;
    assert!(matches!(second, Err(BridgeError::TransientNetwork(_))));

    let first = first.await.unwrap();
    assert_eq!(first, Err(BridgeError::Superseded));

    let status = session.status();
    assert_eq!(status.state, ConnectionState::Error);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.breaker.failures, 1);
    assert_eq!(
        status.last_error.as_deref(),
        Some("network error: unreachable")
    );
}

#[tokio::test(start_paused = true)]
async fn status_shows_the_deadline_of_the_attempt_in_flight() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    provider.script([ConnectStep::succeed("slow").after(Duration::from_secs(10))]);
    let session = Arc::new(session(&provider, services(&clock)));
    let started = clock.now();

    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect("client", "key").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = session.status();
    assert!(status.in_flight);
    assert_eq!(status.attempt_started_at, Some(started));
    assert_eq!(
        status.attempt_deadline,
        Some(started + chrono::Duration::seconds(30))
    );

    assert_eq!(pending.await.unwrap(), Ok(()));
    let status = session.status();
    assert_eq!(status.attempt_started_at, None);
    assert_eq!(status.attempt_deadline, None);
}

#[tokio::test(start_paused = true)]
async fn reset_keeps_credentials_but_clears_the_session() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let services = services(&clock);
    let keys = services.keys.clone();
    let persistent = services.storage.persistent.clone();
    let session = session(&provider, services);

    session.connect(" client ", "key").await.unwrap();
    assert!(persistent.exists(&keys.connected_marker(TARGET)));
    assert_eq!(
        persistent.load::<String>(&keys.session_token(TARGET)).as_deref(),
        Some("token-1")
    );

    session.reset().await;

    let status = session.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.attempts, 0);
    assert!(!session.is_syncing());
    assert!(!persistent.exists(&keys.connected_marker(TARGET)));
    assert!(!persistent.exists(&keys.session_token(TARGET)));
    assert_eq!(session.saved_credentials(), Some(Credentials::new("client", "key")));
    assert_eq!(provider.resets(), 1);

    session.reconnect().await.unwrap();
    assert_eq!(session.status().state, ConnectionState::Connected);
    assert_eq!(provider.tokens_seen(), vec![None, None]);
}

#[tokio::test(start_paused = true)]
async fn auth_failure_drops_the_cached_token() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let services = services(&clock);
    let keys = services.keys.clone();
    let persistent = services.storage.persistent.clone();
    let session = session(&provider, services);

    session.connect("client", "key").await.unwrap();
    provider.script([ConnectStep::fail(ProviderError::Unauthorized("token revoked".into()))]);

    let err = session.reconnect().await.unwrap_err();

    assert_eq!(err, BridgeError::Auth("token revoked".into()));
    assert_eq!(provider.tokens_seen(), vec![None, Some("token-1".to_string())]);
    assert!(!persistent.exists(&keys.session_token(TARGET)));
    assert_eq!(session.status().state, ConnectionState::Error);
}

#[tokio::test(start_paused = true)]
async fn transitions_and_failures_are_published() {
    let clock = ManualClock::default();
    let provider = MockProvider::new();
    let session = session(&provider, services(&clock));
    let mut events = session.subscribe();

    session.connect("client", "").await.unwrap_err();
    session.connect("client", "key").await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(
        received,
        vec![
            BridgeEvent::ConnectionFailed {
                target: TARGET.to_string(),
                kind: ErrorKind::Validation,
                message: "Client ID and API key are both required.".to_string(),
            },
            BridgeEvent::ConnectionStatusChanged {
                target: TARGET.to_string(),
                previous: ConnectionState::Disconnected,
                current: ConnectionState::Connecting,
            },
            BridgeEvent::ConnectionStatusChanged {
                target: TARGET.to_string(),
                previous: ConnectionState::Connecting,
                current: ConnectionState::Connected,
            },
        ]
    );
}
