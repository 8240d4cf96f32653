//! Key-value storage tiers.
//!
//! Two tiers back the core:
//! - volatile (session-scoped): folder listings; gone after a restart
//! - persistent: credentials, the "connected" marker, the session token,
//!   document content and the context backup. On disk this is one JSON file
//!   per key in the platform-appropriate config directory:
//!   - Linux: `~/.config/docbridge/`
//!   - macOS: `~/Library/Application Support/docbridge/`
//!   - Windows: `%APPDATA%\docbridge\`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no storage directory available")]
    NoDirectory,
}

/// Raw string storage. Typed helpers live on `dyn KeyValueStore`.
pub trait KeyValueStore: Send + Sync {
    fn save_raw(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn load_raw(&self, key: &str) -> Option<String>;
    fn remove_raw(&self, key: &str) -> Result<(), StorageError>;
}

impl dyn KeyValueStore {
    /// Save a value as JSON.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.save_raw(key, &json)
    }

    /// Load a JSON value.
    ///
    /// Returns `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.load_raw(key)?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                crate::log_warn!("Discarding unreadable storage entry '{}': {}", key, e);
                None
            }
        }
    }

    /// Remove a value.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.remove_raw(key)
    }

    /// Check if a key exists.
    pub fn exists(&self, key: &str) -> bool {
        self.load_raw(key).is_some()
    }
}

// =========================================
// Volatile (in-process) implementation
// =========================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn save_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// =========================================
// Persistent (file) implementation
// =========================================

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store files under an explicit directory (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store files under `<config dir>/<app_name>`.
    pub fn in_config_dir(app_name: &str) -> Result<Self, StorageError> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoDirectory)?;
        Ok(Self::new(config_dir.join(app_name)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

impl KeyValueStore for FileStore {
    fn save_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        // Write-then-rename so a crash never leaves a half-written entry behind.
        let path = self.file_path(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.file_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

// =========================================
// Tiers and key layout
// =========================================

/// The volatile and persistent tiers used by the core.
#[derive(Clone)]
pub struct StorageTiers {
    pub volatile: Arc<dyn KeyValueStore>,
    pub persistent: Arc<dyn KeyValueStore>,
}

impl StorageTiers {
    pub fn new(volatile: Arc<dyn KeyValueStore>, persistent: Arc<dyn KeyValueStore>) -> Self {
        Self {
            volatile,
            persistent,
        }
    }

    /// Both tiers in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// A fresh volatile tier over an existing persistent one, which is what a
    /// process restart looks like.
    pub fn restarted(&self) -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::clone(&self.persistent))
    }
}

/// Storage key layout, namespaced so several apps can share one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn credentials(&self, target: &str) -> String {
        format!("{}:{}:credentials", self.namespace, target)
    }

    pub fn connected_marker(&self, target: &str) -> String {
        format!("{}:{}:connected", self.namespace, target)
    }

    pub fn session_token(&self, target: &str) -> String {
        format!("{}:{}:token", self.namespace, target)
    }

    pub fn listing(&self, folder_id: &str) -> String {
        format!("{}:listing:{}", self.namespace, folder_id)
    }

    pub fn content(&self, document_id: &str) -> String {
        format!("{}:content:{}", self.namespace, document_id)
    }

    pub fn context(&self, conversation_id: &str) -> String {
        format!("{}:context:{}", self.namespace, conversation_id)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("docbridge")
    }
}
