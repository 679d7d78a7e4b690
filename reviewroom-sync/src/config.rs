//! Configuration for the sync engine.
//!
//! `ClientConfig` holds endpoints and credentials and is loaded from TOML.
//! `SyncConfig` holds the engine's timing knobs; its defaults are the
//! values the dashboard ships with.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_endpoint: String,
    pub auth: AuthConfig,
    pub request_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 5_000,
            multiplier: 2.0,
            jitter_ms: 250,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or REVIEWROOM_SYNC_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.ws_endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ws_endpoint",
                reason: "must not be empty".to_string(),
            });
        }
        if self.auth.api_key.is_none() && self.auth.bearer_token.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "auth",
                reason: "api_key or bearer_token must be provided".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconnect.initial_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.initial_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconnect.max_ms < self.reconnect.initial_ms {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.max_ms",
                reason: "must be >= initial_ms".to_string(),
            });
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.multiplier",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.max_attempts",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("REVIEWROOM_SYNC_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

/// Engine timing knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Window in which a cache entry is served without any transport.
    pub cache_fresh_ttl: Duration,
    /// Window in which a cache entry is still usable as a degraded
    /// fallback when no transport is available.
    pub cache_stale_ttl: Duration,
    /// Cache entry bound; least-recently-stored entries are evicted.
    pub cache_max_entries: usize,
    /// At most one applied update per rate window.
    pub rate_window: Duration,
    /// Debounce before a queued batch is flushed.
    pub debounce_delay: Duration,
    /// Hard cap on how long a queued update may wait, measured from the
    /// first queued arrival. Bounds flush delay under sustained traffic.
    pub max_flush_delay: Duration,
    /// Pull request timeout raced against each attempt.
    pub request_timeout: Duration,
    /// Linear backoff unit between pull retries (`retry_delay * attempt`).
    pub retry_delay: Duration,
    /// Maximum pull attempts before the failure surfaces.
    pub max_retries: u32,
    /// Liveness ping interval while connected.
    pub heartbeat_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_fresh_ttl: Duration::from_secs(30),
            cache_stale_ttl: Duration::from_secs(600),
            cache_max_entries: 50,
            rate_window: Duration::from_secs(2),
            debounce_delay: Duration::from_millis(500),
            max_flush_delay: Duration::from_secs(4),
            request_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            max_retries: 3,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_fresh_ttl(mut self, ttl: Duration) -> Self {
        self.cache_fresh_ttl = ttl;
        self
    }

    pub fn with_cache_stale_ttl(mut self, ttl: Duration) -> Self {
        self.cache_stale_ttl = ttl;
        self
    }

    pub fn with_cache_max_entries(mut self, max: usize) -> Self {
        self.cache_max_entries = max;
        self
    }

    pub fn with_rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    pub fn with_max_flush_delay(mut self, delay: Duration) -> Self {
        self.max_flush_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ClientConfig {
        ClientConfig {
            api_base_url: "http://localhost:8080".to_string(),
            ws_endpoint: "ws://localhost:8080/ws".to_string(),
            auth: AuthConfig {
                api_key: Some("test-key".to_string()),
                bearer_token: None,
            },
            request_timeout_ms: 5_000,
            reconnect: ReconnectConfig::default(),
        }
    }

    #[test]
    fn test_config_requires_auth() {
        let mut config = base_config();
        config.auth = AuthConfig {
            api_key: None,
            bearer_token: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let mut config = base_config();
        config.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_reconnect() {
        let mut config = base_config();
        config.reconnect.max_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sync_defaults_match_shipping_values() {
        let config = SyncConfig::default();
        assert_eq!(config.cache_fresh_ttl, Duration::from_secs(30));
        assert_eq!(config.cache_stale_ttl, Duration::from_secs(600));
        assert_eq!(config.cache_max_entries, 50);
        assert_eq!(config.rate_window, Duration::from_secs(2));
        assert_eq!(config.debounce_delay, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_overrides() {
        let config = SyncConfig::new()
            .with_rate_window(Duration::from_millis(100))
            .with_cache_max_entries(5);
        assert_eq!(config.rate_window, Duration::from_millis(100));
        assert_eq!(config.cache_max_entries, 5);
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
            api_base_url = "http://localhost:8080"
            ws_endpoint = "ws://localhost:8080/ws"
            request_timeout_ms = 5000

            [auth]
            api_key = "k"

            [reconnect]
            initial_ms = 1000
            max_ms = 5000
            multiplier = 2.0
            jitter_ms = 250
            max_attempts = 5
        "#;
        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect.max_attempts, 5);
    }
}
