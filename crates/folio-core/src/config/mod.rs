//! Sync configuration
//!
//! Carries the remote endpoint, the bearer credential, and the tuning
//! knobs for the background sync loop. Secret material is redacted from
//! `Debug` output.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default interval between automatic sync cycles
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);
/// Default timeout applied to each remote call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default change log capacity before FIFO eviction kicks in
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Configuration for the sync subsystem
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the sync service, without a trailing slash
    pub endpoint: String,
    /// Bearer credential attached to every remote call
    pub auth_token: String,
    /// Interval between automatic sync cycles
    pub sync_interval: Duration,
    /// Timeout applied to each remote call
    pub request_timeout: Duration,
    /// Change log capacity before FIFO eviction
    pub log_capacity: usize,
}

impl SyncConfig {
    /// Create a configuration with default tuning.
    ///
    /// The endpoint must be an absolute http(s) URL; a trailing slash is
    /// trimmed.
    pub fn new(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: normalize_endpoint(endpoint.into())?,
            auth_token: auth_token.into(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            log_capacity: DEFAULT_LOG_CAPACITY,
        })
    }

    /// Set the interval between automatic sync cycles
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the change log capacity
    #[must_use]
    pub const fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"[REDACTED]")
            .field("sync_interval", &self.sync_interval)
            .field("request_timeout", &self.request_timeout)
            .field("log_capacity", &self.log_capacity)
            .finish()
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(Error::Validation(
            "sync endpoint must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::Validation(
            "sync endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let config = SyncConfig::new("https://sync.folio.example", "token").unwrap();
        assert_eq!(config.endpoint, "https://sync.folio.example");
        assert_eq!(config.sync_interval, DEFAULT_SYNC_INTERVAL);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.log_capacity, DEFAULT_LOG_CAPACITY);
    }

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(SyncConfig::new("  ", "token").is_err());
        assert!(SyncConfig::new("sync.folio.example", "token").is_err());
    }

    #[test]
    fn normalize_endpoint_trims_trailing_slash() {
        let config = SyncConfig::new("https://sync.folio.example/", "token").unwrap();
        assert_eq!(config.endpoint, "https://sync.folio.example");
    }

    #[test]
    fn debug_redacts_auth_token() {
        let config = SyncConfig::new("https://sync.folio.example", "secret-token").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn builder_overrides() {
        let config = SyncConfig::new("https://sync.folio.example", "token")
            .unwrap()
            .with_sync_interval(Duration::from_secs(60))
            .with_request_timeout(Duration::from_secs(10))
            .with_log_capacity(50);

        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.log_capacity, 50);
    }
}
