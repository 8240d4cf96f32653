//! Shared error types including RFC7807 Problem Details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RFC7807 Problem Details (application/problem+json)
///
/// The development provider answers every failed `/api/*` request with this
/// envelope so the client can surface the `detail` instead of a raw body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    fn new(slug: &str, title: &str, status: u16, detail: String) -> Self {
        Self {
            type_url: format!("https://docbridge.dev/problems/{slug}"),
            title: title.to_string(),
            status,
            detail: Some(detail),
            instance: None,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new("bad-request", "Bad Request", 400, detail.into())
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new("unauthorized", "Unauthorized", 401, detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new("not-found", "Not Found", 404, detail.into())
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new("conflict", "Conflict", 409, detail.into())
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new("internal-error", "Internal Server Error", 500, detail.into())
    }
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing message.
/// Prefers `detail`, falls back to `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

/// Transport-level failure reported by a document provider client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("deserialization error: {0}")]
    Deserialize(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Classified failure kinds surfaced by every public operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Busy,
    CircuitOpen,
    Timeout,
    Auth,
    TransientNetwork,
    NotConnected,
    Superseded,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Busy => "busy",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Auth => "auth",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::Superseded => "superseded",
            ErrorKind::Storage => "storage",
        }
    }

    /// Whether a failure of this kind is charged to the circuit breaker.
    pub fn charges_breaker(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Auth | ErrorKind::TransientNetwork
        )
    }
}

/// Error returned by the connection core's public operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    #[error("a connection attempt for '{target}' is already in progress")]
    Busy { target: String },

    #[error("circuit open for '{target}' after {failures} failures; retry in {retry_after_ms}ms")]
    CircuitOpen {
        target: String,
        failures: u32,
        retry_after_ms: u64,
    },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("session expired or revoked: {0}")]
    Auth(String),

    #[error("{0}")]
    TransientNetwork(String),

    #[error("not connected to the document provider")]
    NotConnected,

    #[error("connection attempt was superseded; its result was discarded")]
    Superseded,

    #[error("durable storage write failed: {0}")]
    Storage(String),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Validation(_) => ErrorKind::Validation,
            BridgeError::Busy { .. } => ErrorKind::Busy,
            BridgeError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            BridgeError::Timeout { .. } => ErrorKind::Timeout,
            BridgeError::Auth(_) => ErrorKind::Auth,
            BridgeError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            BridgeError::NotConnected => ErrorKind::NotConnected,
            BridgeError::Superseded => ErrorKind::Superseded,
            BridgeError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Toast text for the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Validation(msg) => msg.clone(),
            BridgeError::Busy { .. } => "Already connecting, please wait.".to_string(),
            BridgeError::CircuitOpen {
                failures,
                retry_after_ms,
                ..
            } => format!(
                "Too many failed attempts ({failures}). Wait {} seconds before retrying.",
                retry_after_ms.div_ceil(1000)
            ),
            BridgeError::Timeout { .. } => {
                "The document provider did not respond in time. Please try again.".to_string()
            }
            BridgeError::Auth(_) => {
                "Your session expired. Please reconnect your document provider.".to_string()
            }
            BridgeError::TransientNetwork(msg) => msg.clone(),
            BridgeError::NotConnected => "Connect your document provider first.".to_string(),
            BridgeError::Superseded => "A newer connection attempt replaced this one.".to_string(),
            BridgeError::Storage(_) => "Changes could not be saved locally.".to_string(),
        }
    }

    /// Classify a provider failure into the public taxonomy.
    ///
    /// HTTP 401/403 and token-related messages are authentication failures;
    /// everything else is transient and keeps its raw message.
    pub fn from_provider(err: &ProviderError) -> Self {
        match err {
            ProviderError::Unauthorized(msg) => BridgeError::Auth(msg.clone()),
            ProviderError::Http { status, body } if *status == 401 || *status == 403 => {
                BridgeError::Auth(try_problem_detail(body).unwrap_or_else(|| body.clone()))
            }
            ProviderError::Http { body, .. } if mentions_token_failure(body) => {
                BridgeError::Auth(try_problem_detail(body).unwrap_or_else(|| body.clone()))
            }
            ProviderError::Http { status, body } => BridgeError::TransientNetwork(
                try_problem_detail(body).unwrap_or_else(|| format!("HTTP {status}: {body}")),
            ),
            ProviderError::Network(msg) if mentions_token_failure(msg) => {
                BridgeError::Auth(msg.clone())
            }
            other => BridgeError::TransientNetwork(other.to_string()),
        }
    }
}

impl From<ProviderError> for BridgeError {
    fn from(err: ProviderError) -> Self {
        BridgeError::from_provider(&err)
    }
}

fn mentions_token_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("invalid_grant")
        || lower.contains("invalid token")
        || lower.contains("token expired")
        || lower.contains("token has expired")
        || lower.contains("token revoked")
        || lower.contains("token has been revoked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unauthorized_statuses_classify_as_auth() {
        let problem = serde_json::to_string(&ProblemDetails::unauthorized("token expired")).unwrap();
        let err = BridgeError::from_provider(&ProviderError::Http {
            status: 401,
            body: problem,
        });
        assert_eq!(err, BridgeError::Auth("token expired".to_string()));

        let err = BridgeError::from_provider(&ProviderError::Http {
            status: 403,
            body: "forbidden".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn token_messages_classify_as_auth_regardless_of_status() {
        let err = BridgeError::from_provider(&ProviderError::Http {
            status: 400,
            body: "{\"error\":\"invalid_grant\"}".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn other_failures_are_transient_with_raw_message() {
        let err = BridgeError::from_provider(&ProviderError::Network("connection refused".into()));
        assert_eq!(
            err,
            BridgeError::TransientNetwork("network error: connection refused".to_string())
        );

        let problem = serde_json::to_string(&ProblemDetails::internal_error("disk full")).unwrap();
        let err = BridgeError::from_provider(&ProviderError::Http {
            status: 500,
            body: problem,
        });
        assert_eq!(err, BridgeError::TransientNetwork("disk full".to_string()));
    }

    #[test]
    fn circuit_open_message_rounds_wait_up() {
        let err = BridgeError::CircuitOpen {
            target: "qrypto".into(),
            failures: 3,
            retry_after_ms: 1_200,
        };
        assert_eq!(
            err.user_message(),
            "Too many failed attempts (3). Wait 2 seconds before retrying."
        );
    }

    #[test]
    fn problem_detail_falls_back_to_title() {
        let body = r#"{"type":"x","title":"Conflict","status":409,"detail":"  "}"#;
        assert_eq!(try_problem_detail(body), Some("Conflict".to_string()));
        assert_eq!(try_problem_detail("not json"), None);
    }
}
