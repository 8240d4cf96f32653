//! Typed notifications for presentation layers.
//!
//! Stores publish here after they change; subscribers (UI trees, the CLI)
//! never poll the stores for changes.

use docbridge_shared::{ConnectionState, DocumentRef, ErrorKind};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Event types dispatched to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The connection store moved a target to a new state
    ConnectionStatusChanged {
        target: String,
        previous: ConnectionState,
        current: ConnectionState,
    },
    /// A public operation failed; `message` is user-facing
    ConnectionFailed {
        target: String,
        kind: ErrorKind,
        message: String,
    },
    /// A conversation's document context changed
    DocumentContextUpdated {
        conversation_id: String,
        documents: Vec<DocumentRef>,
    },
    /// Toast-equivalent message
    Notice { level: NoticeLevel, message: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: BridgeEvent) {
        crate::log_debug!("event: {:?}", event);
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(BridgeEvent::Notice {
            level,
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
