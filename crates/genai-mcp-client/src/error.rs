//! Error types for client construction and configuration.
//!
//! Calls that reach the server never fail with [`McpError`]: every transport
//! and protocol failure is folded into a [`JsonRpcResponse`] error instead.
//! These errors only surface while building a client or loading its config.
//!
//! [`JsonRpcResponse`]: crate::protocol::JsonRpcResponse

use thiserror::Error;

/// Result type for client setup operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for client setup operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The HTTP transport could not be created.
    #[error("transport error: {0}")]
    Transport(String),

    /// A configuration value is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    ConfigRead {
        /// Path of the config file.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Provider name not recognized.
    #[error("unknown provider '{0}' (expected gemini, wan or apimart)")]
    UnknownProvider(String),
}

impl McpError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
