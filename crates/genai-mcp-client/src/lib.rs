//! JSON-RPC session client for the genai MCP image server.
//!
//! The server exposes image generation and editing as MCP tools. Some
//! providers answer synchronously; others hand back a task id that has to be
//! polled until the task finishes. This crate hides both behind calls that
//! return one [`JsonRpcResponse`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ImageClient                                                │
//! │  - Provider table (gemini / wan / apimart)                  │
//! │  - generate_image, edit_image: direct or create-then-poll   │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  poll_task                                                  │
//! │  - Bounded status queries, status probing/classification    │
//! └─────────────────────────────────────────────────────────────┘
//!                           │  ToolCaller
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SessionClient                                              │
//! │  - initialize, tools/list, tools/call                       │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  HttpTransport                                              │
//! │  - Blocking POST, Mcp-Session-Id affinity, no proxy         │
//! │  - Every failure folded into a -32603 response              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use genai_mcp_client::{ClientConfig, ImageClient, Provider};
//!
//! # fn main() -> genai_mcp_client::Result<()> {
//! let config = ClientConfig::default()
//!     .with_base_url("http://127.0.0.1:8080/mcp")
//!     .with_provider(Provider::Wan);
//!
//! let mut images = ImageClient::new(&config)?;
//! let init = images.initialize();
//! if let Some(error) = &init.error {
//!     eprintln!("handshake failed: {}", error);
//! }
//!
//! let response = images.generate_image("a lighthouse at dusk");
//! match response.first_text() {
//!     Some(text) => println!("{}", text),
//!     None => println!("{:?}", response),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error handling
//!
//! Nothing that talks to the server returns `Err`. Transport failures become
//! `-32603` responses, server errors pass through unchanged, and payloads the
//! client cannot interpret are returned raw. [`McpError`] is only produced
//! while building a client or loading configuration.

pub mod client;
pub mod config;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod provider;
pub mod transport;

// Re-export main types
pub use client::{SessionClient, ToolCaller};
pub use config::{ClientConfig, PollConfig};
pub use error::{McpError, Result};
pub use poller::{
    PollOptions, PollOutcome, StatusReading, TaskHandle, TaskStatus, extract_status, poll_task,
    poll_task_outcome,
};
pub use protocol::{
    CallToolParams, CallToolResult, ClientInfo, ContentItem, InitializeParams, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolInfo,
};
pub use provider::{CreatedTask, ImageClient, Provider, ProviderRoutes, TaskRoute, ToolRoute};
pub use transport::{HttpTransport, HttpTransportConfig};
