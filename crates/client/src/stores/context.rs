//! Per-conversation document context.
//!
//! Every mutation writes the in-memory map and mirrors the full list to the
//! persistent tier. Reads prefer memory and fall back to the durable backup,
//! so a context survives a restart even though memory does not.

use std::collections::HashMap;
use std::sync::Arc;

use docbridge_shared::{BridgeError, DocumentContextEntry, DocumentRef};
use parking_lot::Mutex;

use crate::events::{BridgeEvent, EventBus};
use crate::storage::{KeySpace, KeyValueStore};

/// Result of a context mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUpdate {
    pub changed: bool,
    pub documents: Vec<DocumentRef>,
}

pub struct ContextStore {
    memory: Mutex<HashMap<String, Vec<DocumentRef>>>,
    backup: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    events: EventBus,
}

impl ContextStore {
    pub fn new(backup: Arc<dyn KeyValueStore>, keys: KeySpace, events: EventBus) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            backup,
            keys,
            events,
        }
    }

    fn load_backup(&self, conversation_id: &str) -> Option<Vec<DocumentRef>> {
        self.backup
            .load::<DocumentContextEntry>(&self.keys.context(conversation_id))
            .map(|entry| entry.documents)
    }

    fn write_backup(&self, conversation_id: &str, documents: &[DocumentRef]) -> Result<(), BridgeError> {
        let key = self.keys.context(conversation_id);
        let result = if documents.is_empty() {
            self.backup.remove(&key)
        } else {
            self.backup.save(
                &key,
                &DocumentContextEntry {
                    conversation_id: conversation_id.to_string(),
                    documents: documents.to_vec(),
                },
            )
        };
        result.map_err(|e| {
            crate::log_error!("Context backup for '{}' failed: {}", conversation_id, e);
            BridgeError::Storage(e.to_string())
        })
    }

    /// Attach `document` to a conversation. Adding an id that is already
    /// present changes nothing.
    pub fn add_document(
        &self,
        conversation_id: &str,
        document: DocumentRef,
    ) -> Result<ContextUpdate, BridgeError> {
        validate(conversation_id, "conversation id")?;
        validate(&document.id, "document id")?;

        // The backup is read and written under the memory lock so concurrent
        // mutations of one conversation leave both tiers in the same order.
        let (changed, documents) = {
            let mut memory = self.memory.lock();
            let backup = self.load_backup(conversation_id);
            let docs = memory
                .entry(conversation_id.to_string())
                .or_insert_with(|| backup.clone().unwrap_or_default());
            let changed = !docs.iter().any(|d| d.id == document.id);
            if changed {
                docs.push(document);
            }
            let documents = docs.clone();

            // Mirror even when unchanged so a stale backup converges.
            if backup.as_ref() != Some(&documents) {
                self.write_backup(conversation_id, &documents)?;
            }
            (changed, documents)
        };

        if changed {
            self.events.emit(BridgeEvent::DocumentContextUpdated {
                conversation_id: conversation_id.to_string(),
                documents: documents.clone(),
            });
        }

        Ok(ContextUpdate { changed, documents })
    }

    /// Detach a document. Returns whether anything changed in either tier.
    pub fn remove_document(&self, conversation_id: &str, document_id: &str) -> Result<bool, BridgeError> {
        validate(conversation_id, "conversation id")?;
        validate(document_id, "document id")?;

        let (memory_changed, backup_differs, documents) = {
            let mut memory = self.memory.lock();
            let backup = self.load_backup(conversation_id);
            let docs = memory
                .entry(conversation_id.to_string())
                .or_insert_with(|| backup.clone().unwrap_or_default());
            let before = docs.len();
            docs.retain(|d| d.id != document_id);
            let memory_changed = docs.len() != before;
            let documents = docs.clone();
            if documents.is_empty() {
                memory.remove(conversation_id);
            }

            let backup_differs = backup.unwrap_or_default() != documents;
            if backup_differs {
                self.write_backup(conversation_id, &documents)?;
            }
            (memory_changed, backup_differs, documents)
        };

        let changed = memory_changed || backup_differs;
        if changed {
            self.events.emit(BridgeEvent::DocumentContextUpdated {
                conversation_id: conversation_id.to_string(),
                documents,
            });
        }
        Ok(changed)
    }

    /// Documents attached to a conversation: memory first, then the backup.
    pub fn get_documents(&self, conversation_id: &str) -> Vec<DocumentRef> {
        if let Some(docs) = self.memory.lock().get(conversation_id) {
            return docs.clone();
        }
        self.load_backup(conversation_id).unwrap_or_default()
    }

    pub fn contains(&self, conversation_id: &str, document_id: &str) -> bool {
        self.get_documents(conversation_id)
            .iter()
            .any(|d| d.id == document_id)
    }

    /// Drop a conversation's context from both tiers.
    pub fn clear(&self, conversation_id: &str) -> Result<bool, BridgeError> {
        let (had_memory, had_backup) = {
            let mut memory = self.memory.lock();
            let had_memory = memory.remove(conversation_id).is_some();
            let had_backup = self.load_backup(conversation_id).is_some();
            if had_backup {
                self.write_backup(conversation_id, &[])?;
            }
            (had_memory, had_backup)
        };

        let changed = had_memory || had_backup;
        if changed {
            self.events.emit(BridgeEvent::DocumentContextUpdated {
                conversation_id: conversation_id.to_string(),
                documents: Vec::new(),
            });
        }
        Ok(changed)
    }
}

fn validate(value: &str, what: &str) -> Result<(), BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError};
    use pretty_assertions::assert_eq;

    fn store() -> (ContextStore, Arc<dyn KeyValueStore>) {
        let backup: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        (
            ContextStore::new(backup.clone(), KeySpace::default(), EventBus::default()),
            backup,
        )
    }

    fn doc(id: &str) -> DocumentRef {
        DocumentRef::new(id, format!("{id}.txt"), "text/plain")
    }

    #[test]
    fn add_is_idempotent() {
        let (ctx, _) = store();
        assert!(ctx.add_document("conv1", doc("doc1")).unwrap().changed);
        let again = ctx.add_document("conv1", doc("doc1")).unwrap();

        assert!(!again.changed);
        assert_eq!(again.documents, vec![doc("doc1")]);
    }

    #[test]
    fn blank_ids_are_rejected() {
        let (ctx, _) = store();
        assert!(matches!(
            ctx.add_document(" ", doc("doc1")),
            Err(BridgeError::Validation(_))
        ));
        assert!(matches!(
            ctx.remove_document("conv1", ""),
            Err(BridgeError::Validation(_))
        ));
    }

    #[test]
    fn backup_mirrors_memory() {
        let (ctx, backup) = store();
        ctx.add_document("conv1", doc("doc1")).unwrap();
        ctx.add_document("conv1", doc("doc2")).unwrap();

        let key = KeySpace::default().context("conv1");
        assert_eq!(
            backup.load::<DocumentContextEntry>(&key),
            Some(DocumentContextEntry {
                conversation_id: "conv1".to_string(),
                documents: ctx.get_documents("conv1"),
            })
        );

        ctx.remove_document("conv1", "doc1").unwrap();
        ctx.remove_document("conv1", "doc2").unwrap();
        assert!(!backup.exists(&key));
        assert!(ctx.get_documents("conv1").is_empty());
    }

    #[test]
    fn concurrent_adds_leave_both_tiers_equal() {
        for _ in 0..50 {
            let (ctx, backup) = store();
            let ctx = Arc::new(ctx);
            let writers: Vec<_> = (0..8)
                .map(|i| {
                    let ctx = Arc::clone(&ctx);
                    std::thread::spawn(move || {
                        ctx.add_document("conv1", doc(&format!("doc{i}"))).unwrap();
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }

            let memory = ctx.get_documents("conv1");
            let durable = backup
                .load::<DocumentContextEntry>(&KeySpace::default().context("conv1"))
                .map(|entry| entry.documents)
                .unwrap_or_default();
            assert_eq!(memory.len(), 8);
            assert_eq!(durable, memory);
        }
    }

    #[test]
    fn clear_empties_both_tiers() {
        let (ctx, backup) = store();
        ctx.add_document("conv1", doc("doc1")).unwrap();

        assert!(ctx.clear("conv1").unwrap());
        assert!(!ctx.clear("conv1").unwrap());
        assert!(!backup.exists(&KeySpace::default().context("conv1")));
    }

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn save_raw(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }

        fn load_raw(&self, _key: &str) -> Option<String> {
            None
        }

        fn remove_raw(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn failed_backup_write_is_reported() {
        let ctx = ContextStore::new(Arc::new(ReadOnlyStore), KeySpace::default(), EventBus::default());

        let result = ctx.add_document("conv1", doc("doc1"));

        assert!(matches!(result, Err(BridgeError::Storage(_))));
        // memory already holds the document; no rollback
        assert_eq!(ctx.get_documents("conv1"), vec![doc("doc1")]);
    }
}
