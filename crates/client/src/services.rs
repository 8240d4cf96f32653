//! Shared collaborators wired once per process.

use std::sync::Arc;

use crate::breaker::BreakerRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::events::EventBus;
use crate::storage::{FileStore, KeySpace, MemoryStore, StorageError, StorageTiers};
use crate::stores::ConnectionStore;

/// Everything the connection core and the caches share.
///
/// Cloning is cheap; all clones observe the same breakers, store and bus.
#[derive(Clone)]
pub struct CoreServices {
    pub config: Arc<BridgeConfig>,
    pub clock: Arc<dyn Clock>,
    pub storage: StorageTiers,
    pub keys: KeySpace,
    pub breakers: Arc<BreakerRegistry>,
    pub connections: Arc<ConnectionStore>,
    pub events: EventBus,
}

impl CoreServices {
    pub fn new(config: BridgeConfig, storage: StorageTiers, clock: Arc<dyn Clock>) -> Self {
        let events = EventBus::default();
        Self {
            keys: KeySpace::new(config.namespace.clone()),
            breakers: Arc::new(BreakerRegistry::new(config.breaker, clock.clone())),
            connections: Arc::new(ConnectionStore::new(events.clone())),
            config: Arc::new(config),
            clock,
            storage,
            events,
        }
    }

    /// Both tiers in memory, real clock.
    pub fn in_memory(config: BridgeConfig) -> Self {
        Self::new(config, StorageTiers::in_memory(), Arc::new(SystemClock))
    }

    /// Persistent tier on disk: `storage_dir` if set, else the platform config dir.
    pub fn from_config(config: BridgeConfig) -> Result<Self, StorageError> {
        let files = match &config.storage_dir {
            Some(dir) => FileStore::new(dir),
            None => FileStore::in_config_dir(&config.namespace)?,
        };
        crate::log_debug!("Persistent storage at {}", files.dir().display());
        let storage = StorageTiers::new(Arc::new(MemoryStore::new()), Arc::new(files));
        Ok(Self::new(config, storage, Arc::new(SystemClock)))
    }
}
