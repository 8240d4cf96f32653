//! The operation surface presentation layers call.

use std::sync::Arc;

use docbridge_shared::{BridgeError, ConnectionState, ConnectionStatus, Credentials, DocumentRef};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::cache::{DocumentCache, Listing};
use crate::connection::{ConnectionManager, SyncHandle};
use crate::events::{BridgeEvent, NoticeLevel};
use crate::provider::DocumentProvider;
use crate::services::CoreServices;
use crate::stores::{ContextStore, ContextUpdate};

/// One target's connection, its document cache and the conversation
/// contexts, behind a single handle.
pub struct DocumentSession {
    manager: Arc<ConnectionManager>,
    cache: DocumentCache,
    context: ContextStore,
    services: CoreServices,
    sync: Mutex<Option<SyncHandle>>,
}

impl DocumentSession {
    pub fn new(target: impl Into<String>, provider: Arc<dyn DocumentProvider>, services: CoreServices) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(target, provider, services.clone())),
            cache: DocumentCache::new(&services),
            context: ContextStore::new(
                services.storage.persistent.clone(),
                services.keys.clone(),
                services.events.clone(),
            ),
            services,
            sync: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.services.events.subscribe()
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    // --- Connection ---

    pub async fn connect(&self, client_id: &str, api_key: &str) -> Result<(), BridgeError> {
        self.manager.connect(client_id, api_key).await?;
        self.start_sync();
        Ok(())
    }

    /// Connect with the saved credential pair.
    pub async fn reconnect(&self) -> Result<(), BridgeError> {
        let Some(credentials) = self.saved_credentials() else {
            return Err(BridgeError::Validation(
                "No saved credentials. Connect with a client ID and API key first.".to_string(),
            ));
        };
        self.connect(&credentials.client_id, &credentials.api_key).await
    }

    pub async fn reset(&self) {
        self.stop_sync();
        self.cache.invalidate_all();
        self.manager.reset().await;
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn saved_credentials(&self) -> Option<Credentials> {
        self.manager.saved_credentials()
    }

    /// Seed state from durable storage and run the auto-reconnect check once.
    ///
    /// Returns the auto-reconnect result if one was attempted.
    pub async fn restore(&self) -> Option<Result<(), BridgeError>> {
        self.manager.restore();
        let reconnect = self.manager.maybe_auto_reconnect().await;
        if self.manager.state() == ConnectionState::Connected {
            self.start_sync();
        }
        reconnect
    }

    pub fn start_sync(&self) {
        let handle = SyncHandle::spawn(Arc::clone(&self.manager), self.services.config.sync_interval);
        // Replacing the handle drops, and so stops, any previous loop.
        *self.sync.lock() = Some(handle);
    }

    pub fn stop_sync(&self) {
        if let Some(handle) = self.sync.lock().take() {
            handle.stop();
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.lock().as_ref().is_some_and(SyncHandle::is_running)
    }

    // --- Documents ---

    fn ensure_connected(&self) -> Result<(), BridgeError> {
        if self.manager.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(BridgeError::NotConnected)
        }
    }

    /// A dead session surfaces as list/fetch failures; reset on those.
    async fn on_failure(&self, err: BridgeError) -> BridgeError {
        if matches!(err, BridgeError::Auth(_)) {
            crate::log_warn!("Session for '{}' rejected; resetting", self.manager.target());
            self.reset().await;
        }
        self.services.events.notice(NoticeLevel::Error, err.user_message());
        err
    }

    pub async fn list(&self, folder_id: Option<&str>) -> Result<Listing, BridgeError> {
        self.ensure_connected()?;
        match self.cache.list(self.manager.provider(), folder_id).await {
            Ok(listing) => Ok(listing),
            Err(err) => Err(self.on_failure(err).await),
        }
    }

    pub async fn force_refresh(&self, folder_id: Option<&str>) -> Result<Listing, BridgeError> {
        self.ensure_connected()?;
        match self.cache.force_refresh(self.manager.provider(), folder_id).await {
            Ok(listing) => Ok(listing),
            Err(err) => Err(self.on_failure(err).await),
        }
    }

    pub async fn fetch(&self, document_id: &str) -> Result<String, BridgeError> {
        self.ensure_connected()?;
        match self.cache.fetch(self.manager.provider(), document_id).await {
            Ok(content) => Ok(content),
            Err(err) => Err(self.on_failure(err).await),
        }
    }

    // --- Context ---

    /// Attach a document to a conversation, fetching its content first if
    /// it has none and isn't attached yet.
    pub async fn add_document_to_context(
        &self,
        conversation_id: &str,
        document: DocumentRef,
    ) -> Result<ContextUpdate, BridgeError> {
        if conversation_id.trim().is_empty() {
            return Err(BridgeError::Validation("conversation id must not be empty".to_string()));
        }

        let document = if document.content.is_none()
            && !self.context.contains(conversation_id, &document.id)
        {
            let content = self.fetch(&document.id).await?;
            document.with_content(content)
        } else {
            document
        };

        self.context.add_document(conversation_id, document)
    }

    pub fn remove_document_from_context(
        &self,
        conversation_id: &str,
        document_id: &str,
    ) -> Result<bool, BridgeError> {
        self.context.remove_document(conversation_id, document_id)
    }

    pub fn get_documents_in_context(&self, conversation_id: &str) -> Vec<DocumentRef> {
        self.context.get_documents(conversation_id)
    }

    pub fn clear_context(&self, conversation_id: &str) -> Result<bool, BridgeError> {
        self.context.clear(conversation_id)
    }
}
