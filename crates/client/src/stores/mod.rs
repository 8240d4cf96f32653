//! Stores for connection and document-context state.

pub mod connection;
pub mod context;

pub use connection::{AttemptId, ConnectionAttempt, ConnectionStore, TargetConnection};
pub use context::{ContextStore, ContextUpdate};
