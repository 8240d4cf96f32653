//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// A client registered at start-up so the provider is usable without an admin API.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedClient {
    pub client_id: String,
    pub api_key: String,
}

impl std::fmt::Debug for SeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedClient")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub base_url: String,
    pub db_path: String,
    pub session_ttl: Duration,
    pub seed_client: Option<SeedClient>,
}

impl ServerConfig {
    /// Environment variables:
    /// - `DOCBRIDGE_BIND`: listen address (default: "0.0.0.0:8080")
    /// - `DOCBRIDGE_BASE_URL`: public base URL (default: "http://localhost:8080")
    /// - `DOCBRIDGE_DB_PATH`: Aurora data directory (default: "docbridge_db_data")
    /// - `DOCBRIDGE_SESSION_TTL_SECS`: session lifetime (default: 3600)
    /// - `DOCBRIDGE_SEED_CLIENT`: "client_id:api_key" registered on start-up
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let bind = lookup("DOCBRIDGE_BIND")
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!("Ignoring DOCBRIDGE_BIND={}: {}", v, e);
                    None
                }
            })
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let session_ttl = lookup("DOCBRIDGE_SESSION_TTL_SECS")
            .and_then(|v| match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    tracing::warn!("Ignoring DOCBRIDGE_SESSION_TTL_SECS={}", v);
                    None
                }
            })
            .unwrap_or(Duration::from_secs(3600));

        let seed_client = lookup("DOCBRIDGE_SEED_CLIENT").and_then(|v| {
            let parsed = v
                .split_once(':')
                .map(|(id, key)| (id.trim(), key.trim()))
                .filter(|(id, key)| !id.is_empty() && !key.is_empty());
            if parsed.is_none() {
                tracing::warn!("Ignoring DOCBRIDGE_SEED_CLIENT; expected client_id:api_key");
            }
            parsed.map(|(id, key)| SeedClient {
                client_id: id.to_string(),
                api_key: key.to_string(),
            })
        });

        Self {
            bind,
            base_url: lookup("DOCBRIDGE_BASE_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            db_path: lookup("DOCBRIDGE_DB_PATH").unwrap_or_else(|| "docbridge_db_data".to_string()),
            session_ttl,
            seed_client,
        }
    }
}
