//! HTTP protocol spoken between the client's provider and the development provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DocumentRef;

/// Discovery document path; fetching it is the client's "library load" step.
pub const DISCOVERY_PATH: &str = "/.well-known/docbridge-provider";
pub const SESSION_PATH: &str = "/api/session";
pub const DOCUMENTS_PATH: &str = "/api/documents";

/// Folder id used when the caller does not name one.
pub const ROOT_FOLDER: &str = "root";

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Path of a document's content endpoint (the id must already be URL-encoded).
pub fn content_path(encoded_document_id: &str) -> String {
    format!("{DOCUMENTS_PATH}/{encoded_document_id}/content")
}

/// Format a bearer authorization header value.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Extract the token from a `Bearer <token>` header value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    pub provider: String,
    pub protocol_version: String,
    pub session_endpoint: String,
    pub documents_endpoint: String,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub client_id: String,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_token: Option<String>,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("client_id", &self.client_id)
            .field("has_cached_token", &self.cached_token.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub connected: bool,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContentResponse {
    pub id: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub name: String,
    pub mime_type: String,
    pub content: String,
}

/// Response body of `POST /api/documents`.
pub type CreateDocumentResponse = DocumentRef;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header_case_insensitively() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer   abc "), Some("abc"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
    }

    #[test]
    fn connect_request_debug_hides_secrets() {
        let req = ConnectRequest {
            client_id: "client".into(),
            api_key: "secret-key".into(),
            cached_token: Some("secret-token".into()),
        };
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(!rendered.contains("secret-token"));
    }
}
