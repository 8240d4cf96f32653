//! Scripted in-process provider and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docbridge_client::{
    BridgeConfig, CoreServices, DocumentProvider, DocumentSession, HandshakeOutcome, ManualClock,
    StorageTiers,
};
use docbridge_shared::{Credentials, DocumentRef, ProviderError};
use parking_lot::Mutex;

pub const TARGET: &str = "qrypto";

/// One scripted handshake.
pub struct ConnectStep {
    pub delay: Duration,
    pub result: Result<HandshakeOutcome, ProviderError>,
}

impl ConnectStep {
    pub fn succeed(token: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(HandshakeOutcome::connected(Some(token.to_string()))),
        }
    }

    pub fn fail(err: ProviderError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(err),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
pub struct MockProvider {
    pub connect_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
    pub reload_calls: AtomicUsize,
    connected: AtomicBool,
    api_loaded: AtomicBool,
    script: Mutex<VecDeque<ConnectStep>>,
    tokens_seen: Mutex<Vec<Option<String>>>,
    documents: Mutex<HashMap<String, Vec<DocumentRef>>>,
    contents: Mutex<HashMap<String, String>>,
    list_error: Mutex<Option<ProviderError>>,
    fetch_error: Mutex<Option<ProviderError>>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue handshake results; unscripted handshakes succeed.
    pub fn script(&self, steps: impl IntoIterator<Item = ConnectStep>) {
        self.script.lock().extend(steps);
    }

    pub fn set_documents(&self, folder: &str, documents: Vec<DocumentRef>) {
        self.documents.lock().insert(folder.to_string(), documents);
    }

    pub fn set_content(&self, document_id: &str, content: &str) {
        self.contents
            .lock()
            .insert(document_id.to_string(), content.to_string());
    }

    pub fn fail_lists_with(&self, err: Option<ProviderError>) {
        *self.list_error.lock() = err;
    }

    pub fn fail_fetches_with(&self, err: Option<ProviderError>) {
        *self.fetch_error.lock() = err;
    }

    /// Simulate the remote session dying on its own.
    pub fn drop_session(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn revive_session(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn session_alive(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens_seen.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentProvider for MockProvider {
    async fn is_connected(&self) -> bool {
        self.session_alive()
    }

    async fn connect(
        &self,
        _credentials: &Credentials,
        cached_token: Option<&str>,
    ) -> Result<HandshakeOutcome, ProviderError> {
        let n = self.connect_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.tokens_seen.lock().push(cached_token.map(str::to_string));

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| ConnectStep::succeed(&format!("token-{n}")));
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        if matches!(&step.result, Ok(outcome) if outcome.connected) {
            self.connected.store(true, Ordering::SeqCst);
        }
        step.result
    }

    async fn reset_connection(&self) -> Result<(), ProviderError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn reload_client_library(&self) -> Result<(), ProviderError> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        self.api_loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_api_loaded(&self) -> bool {
        self.api_loaded.load(Ordering::SeqCst)
    }

    async fn list_documents(&self, folder_id: Option<&str>) -> Result<Vec<DocumentRef>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_error.lock().clone() {
            return Err(err);
        }
        let folder = folder_id.unwrap_or("root");
        Ok(self.documents.lock().get(folder).cloned().unwrap_or_default())
    }

    async fn fetch_document_content(&self, document_id: &str) -> Result<Option<String>, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_error.lock().clone() {
            return Err(err);
        }
        Ok(self.contents.lock().get(document_id).cloned())
    }
}

/// Services over in-memory tiers driven by `clock`.
pub fn services(clock: &ManualClock) -> CoreServices {
    services_on(StorageTiers::in_memory(), clock)
}

pub fn services_on(storage: StorageTiers, clock: &ManualClock) -> CoreServices {
    CoreServices::new(BridgeConfig::default(), storage, Arc::new(clock.clone()))
}

pub fn session(provider: &Arc<MockProvider>, services: CoreServices) -> DocumentSession {
    DocumentSession::new(TARGET, provider.clone(), services)
}

pub fn doc(id: &str) -> DocumentRef {
    DocumentRef::new(id, format!("{id}.txt"), "text/plain")
}

pub fn docs(prefix: &str, n: usize) -> Vec<DocumentRef> {
    (1..=n).map(|i| doc(&format!("{prefix}-{i}"))).collect()
}
