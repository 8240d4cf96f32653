//! HTTP document provider client with bearer-token sessions.

use async_trait::async_trait;
use docbridge_shared::{
    bearer, content_path, try_problem_detail, ConnectRequest, ConnectResponse, Credentials,
    DiscoveryDocument, DocumentContentResponse, DocumentRef, ProviderError,
    SessionStatusResponse, DISCOVERY_PATH, DOCUMENTS_PATH, HEADER_AUTHORIZATION, SESSION_PATH,
};
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::provider::{DocumentProvider, HandshakeOutcome};

/// HTTP client for the docbridge provider protocol.
#[derive(Debug)]
pub struct HttpProvider {
    client: Client,
    base_url: String,
    token: Mutex<Option<String>>,
    discovery: Mutex<Option<DiscoveryDocument>>,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token: Mutex::new(None),
            discovery: Mutex::new(None),
        }
    }

    /// Use a preconfigured reqwest client (proxies, TLS roots, ...).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_session(&self) -> bool {
        self.token.lock().is_some()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn authorized(&self, rb: RequestBuilder) -> Result<RequestBuilder, ProviderError> {
        let token = self
            .token
            .lock()
            .clone()
            .ok_or_else(|| ProviderError::Unauthorized("no active session".to_string()))?;
        Ok(rb.header(HEADER_AUTHORIZATION, bearer(&token)))
    }

    async fn send<TRes: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<TRes, ProviderError> {
        let resp = rb.send().await.map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(error_from_status(status, text));
        }

        serde_json::from_str(&text).map_err(|e| ProviderError::Deserialize(e.to_string()))
    }

    async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ProviderError> {
        let rb = self.authorized(self.client.get(self.url(path)))?;
        self.send(rb).await
    }

    async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ProviderError> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn fetch_discovery(&self) -> Result<DiscoveryDocument, ProviderError> {
        self.send(self.client.get(self.url(DISCOVERY_PATH))).await
    }

    fn clear_session(&self) {
        self.token.lock().take();
    }
}

fn error_from_status(status: StatusCode, body: String) -> ProviderError {
    if status == StatusCode::UNAUTHORIZED {
        let detail = try_problem_detail(&body).unwrap_or(body);
        return ProviderError::Unauthorized(detail);
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        let detail = try_problem_detail(&body).unwrap_or(body);
        return ProviderError::Unavailable(detail);
    }
    ProviderError::Http {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl DocumentProvider for HttpProvider {
    async fn is_connected(&self) -> bool {
        if !self.has_session() {
            return false;
        }
        match self.get_json::<SessionStatusResponse>(SESSION_PATH).await {
            Ok(status) => {
                if !status.connected {
                    self.clear_session();
                }
                status.connected
            }
            Err(ProviderError::Unauthorized(detail)) => {
                crate::log_info!("Provider session no longer valid: {}", detail);
                self.clear_session();
                false
            }
            Err(e) => {
                // Can't tell; keep the session and report what we believe.
                crate::log_warn!("Session status check failed: {}", e);
                self.has_session()
            }
        }
    }

    async fn connect(
        &self,
        credentials: &Credentials,
        cached_token: Option<&str>,
    ) -> Result<HandshakeOutcome, ProviderError> {
        if !self.is_api_loaded() {
            self.reload_client_library().await?;
        }

        let request = ConnectRequest {
            client_id: credentials.client_id.clone(),
            api_key: credentials.api_key.clone(),
            cached_token: cached_token.map(str::to_string),
        };
        let response: ConnectResponse = self.post_json(SESSION_PATH, &request).await?;

        if !response.connected {
            self.clear_session();
            return Ok(HandshakeOutcome::rejected());
        }

        *self.token.lock() = Some(response.token.clone());
        crate::log_info!(
            "Provider session established for client '{}' (expires {})",
            credentials.client_id,
            response.expires_at
        );
        Ok(HandshakeOutcome::connected(Some(response.token)))
    }

    async fn reset_connection(&self) -> Result<(), ProviderError> {
        let Some(token) = self.token.lock().take() else {
            return Ok(());
        };

        let rb = self
            .client
            .delete(self.url(SESSION_PATH))
            .header(HEADER_AUTHORIZATION, bearer(&token));
        let resp = rb.send().await.map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = resp.status();
        // An already-dead session is as good as a deleted one.
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(error_from_status(status, body))
    }

    async fn reload_client_library(&self) -> Result<(), ProviderError> {
        self.discovery.lock().take();
        let discovery = self.fetch_discovery().await?;
        crate::log_info!(
            "Loaded provider '{}' (protocol {})",
            discovery.provider,
            discovery.protocol_version
        );
        *self.discovery.lock() = Some(discovery);
        Ok(())
    }

    fn is_api_loaded(&self) -> bool {
        self.discovery.lock().is_some()
    }

    async fn list_documents(&self, folder_id: Option<&str>) -> Result<Vec<DocumentRef>, ProviderError> {
        let path = match folder_id {
            Some(folder) => format!("{DOCUMENTS_PATH}?folderId={}", urlencoding::encode(folder)),
            None => DOCUMENTS_PATH.to_string(),
        };
        self.get_json(&path).await
    }

    async fn fetch_document_content(&self, document_id: &str) -> Result<Option<String>, ProviderError> {
        let path = content_path(&urlencoding::encode(document_id));
        match self.get_json::<DocumentContentResponse>(&path).await {
            Ok(resp) => Ok(resp.content),
            Err(ProviderError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
