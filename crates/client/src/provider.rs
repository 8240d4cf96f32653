//! The remote document provider seen from the core.

use async_trait::async_trait;
use docbridge_shared::{Credentials, DocumentRef, ProviderError};

/// Result of a provider handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub connected: bool,
    /// Token worth caching for the next handshake, if the provider issued one.
    pub session_token: Option<String>,
}

impl HandshakeOutcome {
    pub fn connected(session_token: Option<String>) -> Self {
        Self {
            connected: true,
            session_token,
        }
    }

    pub fn rejected() -> Self {
        Self::default()
    }
}

/// Client for a Drive-like remote file service.
///
/// Implementations own their session; the core only asks them to establish,
/// report, or drop it.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// The provider's own view of whether its session is alive.
    async fn is_connected(&self) -> bool;

    async fn connect(
        &self,
        credentials: &Credentials,
        cached_token: Option<&str>,
    ) -> Result<HandshakeOutcome, ProviderError>;

    /// Drop the current session.
    async fn reset_connection(&self) -> Result<(), ProviderError>;

    /// Re-run the client library load sequence.
    async fn reload_client_library(&self) -> Result<(), ProviderError>;

    fn is_api_loaded(&self) -> bool;

    async fn list_documents(&self, folder_id: Option<&str>) -> Result<Vec<DocumentRef>, ProviderError>;

    /// `Ok(None)` when the document exists but has no retrievable content.
    async fn fetch_document_content(&self, document_id: &str) -> Result<Option<String>, ProviderError>;
}
