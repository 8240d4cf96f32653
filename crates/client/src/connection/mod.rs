//! Connection lifecycle.
//!
//! ```text
//! disconnected ──connect──▶ connecting ──ok──▶ connected
//!       ▲                       │                  │
//!       │                       └─fail/timeout─▶ error ──connect──▶ connecting
//!       │                                          │
//!       └──────────── reset (any state) ◀──────────┘
//! connected ──sync sees provider drop──▶ disconnected
//! ```

mod manager;
mod sync;

pub use manager::ConnectionManager;
pub use sync::{reconcile, SyncHandle, SyncOutcome};
