//! Shared data models for the document provider integration.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Connection ---

/// Connection lifecycle state for one breaker target.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth-style credential pair used for the provider handshake.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub client_id: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Both halves of the pair are present and non-blank.
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

// The API key never shows up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Failure count and open/closed posture of one circuit breaker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    pub failures: u32,
    pub is_open: bool,
    /// Milliseconds until the breaker admits another attempt (only while open).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Snapshot of a target's connection, surfaced to callers and the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub target: String,
    pub state: ConnectionState,
    /// Attempts since the last reset. A backoff/UI hint only, never used for gating.
    pub attempts: u32,
    pub in_flight: bool,
    /// When the in-flight attempt started and when its handshake times out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_deadline: Option<DateTime<Utc>>,
    pub breaker: BreakerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub has_saved_credentials: bool,
}

// --- Documents ---

/// A document as listed by the provider, optionally carrying its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Documents currently attached to one conversation, in insertion order.
/// This is the persisted form of a conversation's context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContextEntry {
    pub conversation_id: String,
    pub documents: Vec<DocumentRef>,
}

/// A cached value stamped with the time it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedEntry<T> {
    pub fn new(value: T, cached_at: DateTime<Utc>) -> Self {
        Self { value, cached_at }
    }

    /// A read is a hit only while `now - cached_at < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.cached_at);
        match age.to_std() {
            Ok(age) => age < ttl,
            // cached_at lies in the future; the age is effectively zero
            Err(_) => !ttl.is_zero(),
        }
    }
}
