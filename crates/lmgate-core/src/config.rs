//! Gateway configuration.
//!
//! A `ServerConfig` is immutable for the lifetime of a run; a new value is
//! only adopted through a restart. Validation happens up front so a bad
//! config can never reach the bind step.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default host the gateway binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default gateway port.
pub const DEFAULT_PORT: u16 = 11777;
/// Default cap on concurrently processed requests.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;
/// Default per-request deadline in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
/// Default time allowed for in-flight requests to finish during shutdown.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;
/// Default minimum interval between status-change notifications.
pub const DEFAULT_NOTIFY_MIN_INTERVAL_MS: u64 = 500;

/// Configuration for a single gateway run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host to bind to (e.g., "127.0.0.1" or "0.0.0.0").
    pub host: String,
    /// Port to bind to (0 for auto-assign).
    pub port: u16,
    /// Maximum number of requests processed concurrently; excess requests
    /// are rejected with a backpressure error, not queued.
    pub max_concurrent_requests: usize,
    /// Per-request deadline in milliseconds. A request that exceeds it is
    /// cancelled and counted as an error.
    pub request_timeout_ms: u64,
    /// How long `stop` waits for in-flight requests before cancelling them.
    pub drain_timeout_ms: u64,
    /// Minimum interval between status-change notifications; bursts of
    /// request completions are coalesced into one signal.
    pub notify_min_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            notify_min_interval_ms: DEFAULT_NOTIFY_MIN_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// The `host:port` string handed to the listener bind call.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the configuration before any socket is touched.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.host.contains(':') || self.host.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        Ok(())
    }
}

/// Errors produced by config validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Host was empty or whitespace.
    #[error("host must not be empty")]
    EmptyHost,

    /// Host contained characters that cannot appear in a bind address.
    #[error("invalid host: {0:?}")]
    InvalidHost(String),

    /// A concurrency limit of zero would reject every request.
    #[error("maxConcurrentRequests must be at least 1")]
    ZeroConcurrency,

    /// A request timeout of zero would cancel every request immediately.
    #[error("requestTimeoutMs must be greater than 0")]
    ZeroRequestTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), format!("127.0.0.1:{DEFAULT_PORT}"));
    }

    #[test]
    fn rejects_empty_host() {
        let config = ServerConfig {
            host: "  ".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));
    }

    #[test]
    fn rejects_host_with_port() {
        let config = ServerConfig {
            host: "127.0.0.1:9999".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHost(_))));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let config = ServerConfig {
            max_concurrent_requests: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = ServerConfig {
            request_timeout_ms: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroRequestTimeout));
    }

    #[test]
    fn port_zero_is_allowed_for_auto_assign() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn identical_configs_compare_equal() {
        assert_eq!(ServerConfig::default(), ServerConfig::default());
        let other = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert_ne!(ServerConfig::default(), other);
    }
}
