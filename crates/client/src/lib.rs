//! Docbridge client core
//!
//! Resilient connection handling for a remote document provider: a per-target
//! circuit breaker, a guarded connection state machine with background
//! reconciliation, a two-tier document cache and per-conversation document
//! context that survives restarts.

pub mod logging;

pub mod api_client;
pub mod breaker;
pub mod cache;
pub mod clock;
pub mod config;
pub mod connection;
pub mod events;
pub mod provider;
pub mod ratelimit;
pub mod services;
pub mod session;
pub mod storage;
pub mod stores;
pub mod timeout;

pub use api_client::HttpProvider;
pub use breaker::{BreakerConfig, BreakerRegistry};
pub use cache::{DocumentCache, Freshness, Listing};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BridgeConfig;
pub use connection::{ConnectionManager, SyncHandle, SyncOutcome};
pub use events::{BridgeEvent, EventBus, NoticeLevel};
pub use provider::{DocumentProvider, HandshakeOutcome};
pub use services::CoreServices;
pub use session::DocumentSession;
pub use storage::{FileStore, KeySpace, KeyValueStore, MemoryStore, StorageTiers};
pub use stores::{ConnectionStore, ContextStore, ContextUpdate};
pub use timeout::{with_timeout, TimeoutError};
