//! Client configuration
//!
//! Provides client configuration via TOML files or builder-style setters.
//! Durations are written in milliseconds in TOML (`timeout_ms = 10000`).

use crate::error::{ClientError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound accepted for dial and request timeouts
pub const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connect timeout for a single node
    #[serde(rename = "dial_timeout_ms", with = "duration_ms")]
    pub dial_timeout: Duration,
    /// Total timeout for a single node request
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Health watcher period (zero disables the watcher)
    #[serde(rename = "watch_interval_ms", with = "duration_ms")]
    pub watch_interval: Duration,
    /// Whole-request retries (negative values mean none)
    pub retries: i64,
    /// Extra nodes tried after a connection failure (-1 means all)
    pub connect_retries: i64,
    /// Seed node addresses (`host:port` or URLs)
    pub servers: Vec<String>,
    /// Learn the rest of the cluster from the topology document
    pub discover: bool,
    /// Dump full requests and responses whose path starts with this prefix
    pub dump_requests: Option<String>,
    /// Log timing of requests whose path starts with this prefix
    pub trace_requests: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
            watch_interval: Duration::from_secs(30),
            retries: 0,
            connect_retries: -1,
            servers: Vec::new(),
            discover: false,
            dump_requests: None,
            trace_requests: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given seed servers
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ClientError::Configuration(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn with_retries(mut self, retries: i64) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_connect_retries(mut self, connect_retries: i64) -> Self {
        self.connect_retries = connect_retries;
        self
    }

    pub fn with_discover(mut self, discover: bool) -> Self {
        self.discover = discover;
        self
    }

    pub fn with_trace_requests(mut self, prefix: impl Into<String>) -> Self {
        self.trace_requests = Some(prefix.into());
        self
    }

    pub fn with_dump_requests(mut self, prefix: impl Into<String>) -> Self {
        self.dump_requests = Some(prefix.into());
        self
    }

    /// Whole-request retry count with negative values clamped to zero
    pub fn effective_retries(&self) -> u64 {
        self.retries.max(0) as u64
    }

    /// Connect-retry budget; `None` means unlimited
    pub fn connect_retry_budget(&self) -> Option<usize> {
        if self.connect_retries < 0 {
            None
        } else {
            Some(self.connect_retries as usize)
        }
    }

    /// Parse and normalize the seed server addresses
    pub fn server_addresses(&self) -> Result<Vec<String>> {
        self.servers.iter().map(|s| normalize_address(s)).collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        check_timeout("dial_timeout", self.dial_timeout)?;
        check_timeout("timeout", self.timeout)?;

        if self.connect_retries < -1 {
            return Err(ClientError::Configuration(format!(
                "connect_retries must be -1 or greater, got {}",
                self.connect_retries
            )));
        }

        if self.servers.is_empty() {
            return Err(ClientError::Configuration(
                "at least one server address is required".to_string(),
            ));
        }

        self.server_addresses()?;
        Ok(())
    }
}

fn check_timeout(name: &str, timeout: Duration) -> Result<()> {
    if timeout.is_zero() || timeout > MAX_TIMEOUT {
        return Err(ClientError::Configuration(format!(
            "{} must be within (0, {}s], got {:?}",
            name,
            MAX_TIMEOUT.as_secs(),
            timeout
        )));
    }
    Ok(())
}

/// Normalize a node address to a base URL without trailing slash
///
/// Bare `host:port` addresses are assumed to be plain HTTP.
pub fn normalize_address(address: &str) -> Result<String> {
    let address = address.trim();
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ClientError::Configuration(format!("Invalid address '{}': {}", address, e)))?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ClientError::Configuration(format!(
            "Invalid address '{}': missing host",
            address
        )));
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Configuration(format!(
            "Invalid address '{}': unsupported scheme '{}'",
            address,
            url.scheme()
        )));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
