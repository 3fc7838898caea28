//! Client configuration.
//!
//! Configuration is an explicit value handed to [`SessionClient::new`] or
//! [`ImageClient::new`]; nothing in the crate reads the environment on its
//! own. Callers that want the environment to take part opt in through
//! [`ClientConfig::with_env_overrides`].
//!
//! ```toml
//! base_url = "http://127.0.0.1:8080/mcp"
//! provider = "wan"
//! timeout_secs = 600
//!
//! [poll]
//! max_attempts = 30
//! interval_secs = 2.0
//!
//! [headers]
//! X-Trace = "local"
//! ```
//!
//! [`SessionClient::new`]: crate::client::SessionClient::new
//! [`ImageClient::new`]: crate::provider::ImageClient::new

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{McpError, Result};
use crate::poller::PollOptions;
use crate::protocol::{ClientInfo, MCP_PROTOCOL_VERSION};
use crate::provider::Provider;
use crate::transport::DEFAULT_TIMEOUT;

/// Default MCP endpoint of a locally running image server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/mcp";

/// Environment variable selecting the provider.
pub const ENV_PROVIDER: &str = "GENAI_PROVIDER";

/// Environment variable overriding the endpoint URL.
pub const ENV_BASE_URL: &str = "GENAI_MCP_URL";

/// Environment variable overriding the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "GENAI_MCP_TIMEOUT_SECS";

/// Root client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint URL requests are posted to.
    pub base_url: String,
    /// Provider whose tools are used for image operations.
    pub provider: Provider,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Protocol version sent by the default handshake.
    pub protocol_version: String,
    /// Client info sent by the default handshake.
    pub client_info: ClientInfo,
    /// Polling settings for asynchronous providers.
    pub poll: PollConfig,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            provider: Provider::default(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo::default(),
            poll: PollConfig::default(),
            headers: BTreeMap::new(),
        }
    }
}

/// Polling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Maximum number of status queries per task.
    pub max_attempts: u32,
    /// Delay between status queries, in seconds.
    pub interval_secs: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        let options = PollOptions::default();
        Self {
            max_attempts: options.max_attempts,
            interval_secs: options.interval.as_secs_f64(),
        }
    }
}

impl PollConfig {
    /// Convert to poll options, rejecting negative or non-finite intervals.
    pub fn options(&self) -> Result<PollOptions> {
        let interval = Duration::try_from_secs_f64(self.interval_secs).map_err(|_| {
            McpError::config(format!(
                "poll.interval_secs must be a finite, non-negative number (got {})",
                self.interval_secs
            ))
        })?;
        Ok(PollOptions::new(self.max_attempts, interval))
    }
}

impl ClientConfig {
    /// Parse from a TOML string and validate.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| McpError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "loading client config");
        Self::from_toml_str(&contents)
    }

    /// Apply `GENAI_PROVIDER`, `GENAI_MCP_URL` and `GENAI_MCP_TIMEOUT_SECS`
    /// from the process environment, then validate.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(provider) = env_value(ENV_PROVIDER) {
            self.provider = provider.parse()?;
        }
        if let Some(url) = env_value(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(timeout) = env_value(ENV_TIMEOUT_SECS) {
            self.timeout_secs = timeout.parse().map_err(|_| {
                McpError::config(format!(
                    "{} must be a whole number of seconds (got '{}')",
                    ENV_TIMEOUT_SECS, timeout
                ))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            McpError::config(format!("invalid base_url '{}': {}", self.base_url, e))
        })?;
        if self.timeout_secs == 0 {
            return Err(McpError::config("timeout_secs must be greater than zero"));
        }
        self.poll.options()?;
        Ok(())
    }

    /// Set the endpoint URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the provider.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    /// Set the request timeout, rounded up to whole seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self
    }

    /// Set the polling settings.
    pub fn with_poll(mut self, options: PollOptions) -> Self {
        self.poll = PollConfig {
            max_attempts: options.max_attempts,
            interval_secs: options.interval.as_secs_f64(),
        };
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
