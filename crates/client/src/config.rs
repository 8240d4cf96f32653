//! Client core configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::breaker::BreakerConfig;

/// Tunables for the connection core. Defaults match the provider integration's
/// production settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Deadline for one connect handshake.
    pub connect_timeout: Duration,
    /// Deadline for list/fetch/status calls against the provider.
    pub request_timeout: Duration,
    /// Reconciliation poll interval while a session is active.
    pub sync_interval: Duration,
    pub breaker: BreakerConfig,
    /// Folder listings (volatile tier).
    pub listing_ttl: Duration,
    /// Document content (persistent tier).
    pub content_ttl: Duration,
    /// Anti-bounce window for listing network calls.
    pub min_refresh_interval: Duration,
    /// Directory for the persistent tier; `None` uses the platform config dir.
    pub storage_dir: Option<PathBuf>,
    /// Prefix for every storage key.
    pub namespace: String,
    /// Base URL of the HTTP document provider.
    pub provider_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(30),
            breaker: BreakerConfig::default(),
            listing_ttl: Duration::from_secs(30),
            content_ttl: Duration::from_secs(60 * 60),
            min_refresh_interval: Duration::from_secs(2),
            storage_dir: None,
            namespace: "docbridge".to_string(),
            provider_url: "http://localhost:8080".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables (all optional):
    /// - `DOCBRIDGE_CONNECT_TIMEOUT_MS`, `DOCBRIDGE_REQUEST_TIMEOUT_MS`
    /// - `DOCBRIDGE_SYNC_INTERVAL_MS`
    /// - `DOCBRIDGE_BREAKER_THRESHOLD`, `DOCBRIDGE_BREAKER_COOLDOWN_MS`
    /// - `DOCBRIDGE_LISTING_TTL_MS`, `DOCBRIDGE_CONTENT_TTL_MS`
    /// - `DOCBRIDGE_MIN_REFRESH_MS`
    /// - `DOCBRIDGE_STORAGE_DIR`, `DOCBRIDGE_NAMESPACE`
    /// - `DOCBRIDGE_PROVIDER_URL` (default: "http://localhost:8080")
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`BridgeConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let millis = |name: &str, default: Duration| -> Duration {
            match lookup(name) {
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(ms) => Duration::from_millis(ms),
                    Err(_) => {
                        crate::log_warn!("Ignoring {}={:?}: expected milliseconds", name, raw);
                        default
                    }
                },
                None => default,
            }
        };

        let threshold = match lookup("DOCBRIDGE_BREAKER_THRESHOLD") {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    crate::log_warn!(
                        "Ignoring DOCBRIDGE_BREAKER_THRESHOLD={:?}: expected a positive integer",
                        raw
                    );
                    defaults.breaker.threshold
                }
            },
            None => defaults.breaker.threshold,
        };

        let provider_url = match lookup("DOCBRIDGE_PROVIDER_URL") {
            Some(raw) if url::Url::parse(&raw).is_ok() => raw.trim_end_matches('/').to_string(),
            Some(raw) => {
                crate::log_warn!("Ignoring DOCBRIDGE_PROVIDER_URL={:?}: not a URL", raw);
                defaults.provider_url.clone()
            }
            None => defaults.provider_url.clone(),
        };

        Self {
            connect_timeout: millis("DOCBRIDGE_CONNECT_TIMEOUT_MS", defaults.connect_timeout),
            request_timeout: millis("DOCBRIDGE_REQUEST_TIMEOUT_MS", defaults.request_timeout),
            sync_interval: millis("DOCBRIDGE_SYNC_INTERVAL_MS", defaults.sync_interval),
            breaker: BreakerConfig {
                threshold,
                cooldown: millis("DOCBRIDGE_BREAKER_COOLDOWN_MS", defaults.breaker.cooldown),
            },
            listing_ttl: millis("DOCBRIDGE_LISTING_TTL_MS", defaults.listing_ttl),
            content_ttl: millis("DOCBRIDGE_CONTENT_TTL_MS", defaults.content_ttl),
            min_refresh_interval: millis("DOCBRIDGE_MIN_REFRESH_MS", defaults.min_refresh_interval),
            storage_dir: lookup("DOCBRIDGE_STORAGE_DIR").map(PathBuf::from),
            namespace: lookup("DOCBRIDGE_NAMESPACE")
                .filter(|ns| !ns.trim().is_empty())
                .unwrap_or(defaults.namespace),
            provider_url,
        }
    }
}
