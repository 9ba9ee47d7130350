//! Client configuration.
//!
//! Use the builder methods to customize behavior, or [`ClientConfig::from_env`]
//! to pick up overrides from the environment.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tradewire::config::ClientConfig;
//!
//! let config = ClientConfig::default()
//!     .with_stream_base_url("wss://stream.example.com")
//!     .with_max_reconnect_attempts(3);
//! assert_eq!(config.reconnect.max_attempts, 3);
//! assert_eq!(config.reconnect.max_backoff, Duration::from_secs(30));
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Default URL for the backend API
pub const DEFAULT_API_URL: &str = "https://api.tradewire.app";

/// Default base URL for streaming sockets
pub const DEFAULT_STREAM_URL: &str = "wss://stream.tradewire.app";

/// Storage key of the persisted long-lived credential.
pub const CREDENTIAL_STORAGE_KEY: &str = "auth.credential";

/// Settings for the long-lived credential cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCacheConfig {
    /// Assumed lifetime of a freshly fetched credential (provider issues
    /// hour-long tokens; 55 minutes leaves headroom).
    pub token_lifetime: Duration,
    /// Subtracted from the expiry when deciding whether a token is usable.
    pub safety_margin: Duration,
    /// Key under which the record is persisted.
    pub storage_key: String,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(55 * 60),
            safety_margin: Duration::from_secs(2 * 60),
            storage_key: CREDENTIAL_STORAGE_KEY.to_string(),
        }
    }
}

/// Settings for the stream-token cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTokenConfig {
    /// Subtracted from the expiry when deciding whether a token is usable.
    pub safety_margin: Duration,
    /// Lifetime assumed when the server declares none.
    pub default_lifetime: Duration,
}

impl Default for StreamTokenConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(2),
            default_lifetime: Duration::from_secs(10),
        }
    }
}

/// Reconnect backoff policy shared by every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect; doubled per attempt.
    pub base_backoff: Duration,
    /// Ceiling for any single delay.
    pub max_backoff: Duration,
    /// Attempts before a connection gives up (per connection default).
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Top-level configuration for a tradewire session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the backend API (stream-token exchange lives here)
    pub api_base_url: String,
    /// Base URL streaming endpoint paths are appended to
    pub stream_base_url: String,
    /// Directory for persisted state (defaults to `~/.tradewire`)
    pub data_dir: Option<PathBuf>,
    pub credentials: CredentialCacheConfig,
    pub stream_token: StreamTokenConfig,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            stream_base_url: DEFAULT_STREAM_URL.to_string(),
            data_dir: None,
            credentials: CredentialCacheConfig::default(),
            stream_token: StreamTokenConfig::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new ClientConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_stream_base_url(mut self, url: impl Into<String>) -> Self {
        self.stream_base_url = url.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_credential_config(mut self, credentials: CredentialCacheConfig) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_stream_token_config(mut self, stream_token: StreamTokenConfig) -> Self {
        self.stream_token = stream_token;
        self
    }

    /// Directory for persisted state, falling back to `~/.tradewire`.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".tradewire")))
    }

    /// Create config from environment variables.
    ///
    /// - `TRADEWIRE_API_URL` overrides the API base URL
    /// - `TRADEWIRE_STREAM_URL` overrides the stream base URL
    /// - `TRADEWIRE_DATA_DIR` overrides the data directory
    /// - `TRADEWIRE_MAX_RECONNECTS` overrides the reconnect attempt limit
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("TRADEWIRE_API_URL") {
            config = config.with_api_base_url(url);
        }
        if let Ok(url) = std::env::var("TRADEWIRE_STREAM_URL") {
            config = config.with_stream_base_url(url);
        }
        if let Ok(dir) = std::env::var("TRADEWIRE_DATA_DIR") {
            config = config.with_data_dir(dir);
        }
        if let Some(attempts) = std::env::var("TRADEWIRE_MAX_RECONNECTS")
            .ok()
            .and_then(|value| value.parse().ok())
        {
            config = config.with_max_reconnect_attempts(attempts);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: [&str; 4] = [
        "TRADEWIRE_API_URL",
        "TRADEWIRE_STREAM_URL",
        "TRADEWIRE_DATA_DIR",
        "TRADEWIRE_MAX_RECONNECTS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.stream_base_url, DEFAULT_STREAM_URL);
        assert_eq!(config.credentials.token_lifetime, Duration::from_secs(3300));
        assert_eq!(config.credentials.safety_margin, Duration::from_secs(120));
        assert_eq!(config.stream_token.safety_margin, Duration::from_secs(2));
        assert_eq!(config.stream_token.default_lifetime, Duration::from_secs(10));
        assert_eq!(config.reconnect.base_backoff, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_backoff, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new()
            .with_api_base_url("http://localhost:8000")
            .with_stream_base_url("ws://localhost:9000")
            .with_data_dir("/tmp/tradewire")
            .with_max_reconnect_attempts(2);

        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.stream_base_url, "ws://localhost:9000");
        assert_eq!(config.resolved_data_dir(), Some(PathBuf::from("/tmp/tradewire")));
        assert_eq!(config.reconnect.max_attempts, 2);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        assert_eq!(ClientConfig::from_env(), ClientConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("TRADEWIRE_API_URL", "http://api.local");
        std::env::set_var("TRADEWIRE_STREAM_URL", "ws://stream.local");
        std::env::set_var("TRADEWIRE_MAX_RECONNECTS", "7");

        let config = ClientConfig::from_env();
        assert_eq!(config.api_base_url, "http://api.local");
        assert_eq!(config.stream_base_url, "ws://stream.local");
        assert_eq!(config.reconnect.max_attempts, 7);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_unparseable_attempts() {
        clear_env();
        std::env::set_var("TRADEWIRE_MAX_RECONNECTS", "many");
        assert_eq!(ClientConfig::from_env().reconnect.max_attempts, 5);
        clear_env();
    }
}
