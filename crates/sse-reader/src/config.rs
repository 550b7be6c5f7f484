//! Reader configuration with YAML/TOML support

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};
use crate::transport::{ReqwestTransport, Transport};

/// Reconnection and startup behaviour of a [`SseReader`](crate::SseReader)
///
/// Can be loaded from YAML, TOML, or constructed programmatically:
///
/// ```yaml
/// reconnect_interval: 1500   # milliseconds
/// max_retries: 10
/// auto_connect: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Delay before a failed attempt is retried
    #[serde(default = "default_reconnect_interval", with = "duration_ms")]
    pub reconnect_interval: Duration,

    /// Number of consecutive failures that are retried before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Start the first connection attempt during construction
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

fn default_reconnect_interval() -> Duration {
    Duration::from_millis(3000)
}

fn default_max_retries() -> u32 {
    5
}

fn default_auto_connect() -> bool {
    true
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: default_reconnect_interval(),
            max_retries: default_max_retries(),
            auto_connect: default_auto_connect(),
        }
    }
}

impl ReaderConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before a retry
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the retry cap
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enable or disable connecting during construction
    #[must_use]
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Check that the values can drive a connection
    pub fn validate(&self) -> Result<()> {
        // A zero interval would spin on a failing endpoint.
        if self.reconnect_interval.is_zero() && self.max_retries > 0 {
            return Err(ReaderError::InvalidConfig(
                "reconnect_interval must be > 0 when retries are enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, picking the format from its extension
    ///
    /// `.toml` files are parsed as TOML; anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }
}

/// Everything needed to construct a reader besides its URL
///
/// Supplying a transport (or a preconfigured `reqwest::Client`) is how callers
/// attach custom headers such as `Authorization`.
#[derive(Clone, Default)]
pub struct ReaderOptions {
    /// Reconnection behaviour
    pub config: ReaderConfig,

    /// HTTP transport; a default [`ReqwestTransport`] is used when absent
    pub transport: Option<Arc<dyn Transport>>,
}

impl ReaderOptions {
    /// Options with default configuration and transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration
    #[must_use]
    pub fn config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a preconfigured `reqwest::Client`
    #[must_use]
    pub fn with_client(self, client: reqwest::Client) -> Self {
        self.transport(Arc::new(ReqwestTransport::new(client)))
    }
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("config", &self.config)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
