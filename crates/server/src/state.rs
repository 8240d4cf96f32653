//! Application state shared across request handlers.

use aurora_db::Aurora;
use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Aurora>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: Aurora, config: ServerConfig) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
        }
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}
