//! Document cache.
//!
//! Two tables: folder listings in the volatile tier and document content in
//! the persistent tier, each with its own TTL. The listing miss path sits
//! behind a per-folder anti-bounce limiter; while it is closed the last list
//! fetched from the network is served instead.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use docbridge_shared::{BridgeError, CachedEntry, DocumentRef, ProviderError, ROOT_FOLDER};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::provider::DocumentProvider;
use crate::ratelimit::RateLimiter;
use crate::services::CoreServices;
use crate::storage::{KeySpace, StorageTiers};
use crate::timeout::with_timeout;

/// Where a listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fetched from the provider just now.
    Network,
    /// Served from a cache entry younger than the TTL.
    Cached,
    /// The limiter suppressed a network call; this is the last known list.
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub folder_id: String,
    pub documents: Vec<DocumentRef>,
    pub freshness: Freshness,
}

pub struct DocumentCache {
    storage: StorageTiers,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    listing_ttl: Duration,
    content_ttl: Duration,
    request_timeout: Duration,
    limiter: RateLimiter,
    /// Last list fetched from the network, per folder.
    known: Mutex<HashMap<String, Vec<DocumentRef>>>,
    listing_keys: Mutex<HashSet<String>>,
}

impl DocumentCache {
    pub fn new(services: &CoreServices) -> Self {
        let config = &services.config;
        Self {
            storage: services.storage.clone(),
            keys: services.keys.clone(),
            clock: services.clock.clone(),
            listing_ttl: config.listing_ttl,
            content_ttl: config.content_ttl,
            request_timeout: config.request_timeout,
            limiter: RateLimiter::new(config.min_refresh_interval, services.clock.clone()),
            known: Mutex::new(HashMap::new()),
            listing_keys: Mutex::new(HashSet::new()),
        }
    }

    /// List a folder (`None` is the root).
    pub async fn list(
        &self,
        provider: &Arc<dyn DocumentProvider>,
        folder_id: Option<&str>,
    ) -> Result<Listing, BridgeError> {
        let folder = folder_key(folder_id);
        let key = self.keys.listing(&folder);

        if let Some(entry) = self
            .storage
            .volatile
            .load::<CachedEntry<Vec<DocumentRef>>>(&key)
        {
            if entry.is_fresh(self.clock.now(), self.listing_ttl) {
                crate::log_debug!("Listing cache hit for '{}'", folder);
                return Ok(Listing {
                    folder_id: folder,
                    documents: entry.value,
                    freshness: Freshness::Cached,
                });
            }
        }

        if let Some(remaining) = self.limiter.remaining(&folder) {
            crate::log_debug!(
                "Listing for '{}' rate limited for another {}ms; serving last known list",
                folder,
                remaining.as_millis()
            );
            let documents = self.known.lock().get(&folder).cloned().unwrap_or_default();
            return Ok(Listing {
                folder_id: folder,
                documents,
                freshness: Freshness::RateLimited,
            });
        }

        crate::log_debug!("Listing cache miss for '{}'", folder);
        let documents = {
            let provider = Arc::clone(provider);
            let requested = folder.clone();
            provider_call(
                async move { provider.list_documents(Some(requested.as_str())).await },
                self.request_timeout,
                "list documents",
            )
            .await?
        };

        let entry = CachedEntry::new(documents.clone(), self.clock.now());
        if let Err(e) = self.storage.volatile.save(&key, &entry) {
            crate::log_warn!("Could not cache listing for '{}': {}", folder, e);
        } else {
            self.listing_keys.lock().insert(key);
        }
        self.limiter.record_success(&folder);
        self.known.lock().insert(folder.clone(), documents.clone());

        Ok(Listing {
            folder_id: folder,
            documents,
            freshness: Freshness::Network,
        })
    }

    /// Drop the folder's entry, then list. Still subject to the limiter.
    pub async fn force_refresh(
        &self,
        provider: &Arc<dyn DocumentProvider>,
        folder_id: Option<&str>,
    ) -> Result<Listing, BridgeError> {
        self.invalidate_listing(folder_id);
        self.list(provider, folder_id).await
    }

    /// Document content, from the persistent cache while younger than its TTL.
    pub async fn fetch(
        &self,
        provider: &Arc<dyn DocumentProvider>,
        document_id: &str,
    ) -> Result<String, BridgeError> {
        if document_id.trim().is_empty() {
            return Err(BridgeError::Validation("document id must not be empty".to_string()));
        }
        let key = self.keys.content(document_id);

        if let Some(entry) = self.storage.persistent.load::<CachedEntry<String>>(&key) {
            if entry.is_fresh(self.clock.now(), self.content_ttl) {
                crate::log_debug!("Content cache hit for '{}'", document_id);
                return Ok(entry.value);
            }
        }

        crate::log_debug!("Content cache miss for '{}'", document_id);
        let content = {
            let provider = Arc::clone(provider);
            let id = document_id.to_string();
            provider_call(
                async move { provider.fetch_document_content(&id).await },
                self.request_timeout,
                "fetch document content",
            )
            .await?
        };
        let Some(content) = content else {
            return Err(BridgeError::TransientNetwork(format!(
                "document {document_id} has no retrievable content"
            )));
        };

        let entry = CachedEntry::new(content.clone(), self.clock.now());
        if let Err(e) = self.storage.persistent.save(&key, &entry) {
            crate::log_warn!("Could not cache content for '{}': {}", document_id, e);
        }
        Ok(content)
    }

    pub fn invalidate_listing(&self, folder_id: Option<&str>) {
        let key = self.keys.listing(&folder_key(folder_id));
        if let Err(e) = self.storage.volatile.remove(&key) {
            crate::log_warn!("Could not drop listing '{}': {}", key, e);
        }
        self.listing_keys.lock().remove(&key);
    }

    /// Forget every listing, the known lists and the limiter history.
    /// Content entries stay; they are keyed by document, not by session.
    pub fn invalidate_all(&self) {
        let keys: Vec<String> = self.listing_keys.lock().drain().collect();
        for key in keys {
            if let Err(e) = self.storage.volatile.remove(&key) {
                crate::log_warn!("Could not drop listing '{}': {}", key, e);
            }
        }
        self.known.lock().clear();
        self.limiter.reset();
    }
}

fn folder_key(folder_id: Option<&str>) -> String {
    match folder_id.map(str::trim) {
        Some(folder) if !folder.is_empty() => folder.to_string(),
        _ => ROOT_FOLDER.to_string(),
    }
}

/// Run a provider call under the request deadline and classify its failure.
async fn provider_call<F, T>(call: F, after: Duration, description: &str) -> Result<T, BridgeError>
where
    F: Future<Output = Result<T, ProviderError>> + Send + 'static,
    T: Send + 'static,
{
    match with_timeout(call, after, description).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let err = BridgeError::from_provider(&e);
            crate::log_warn!("{} failed ({}): {}", description, err.kind().as_str(), e);
            Err(err)
        }
        Err(timeout) => Err(BridgeError::Timeout {
            operation: timeout.description.clone(),
            after_ms: timeout.after_ms(),
        }),
    }
}
