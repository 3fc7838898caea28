//! HTTP transport for JSON-RPC calls.
//!
//! Each request is a single blocking POST. The transport owns the
//! server-issued session id: it is echoed on every request once known and
//! replaced whenever a successful response carries a new one.
//!
//! Failures never escape as Rust errors. Connection problems, timeouts,
//! non-2xx statuses and undecodable bodies are all folded into a local
//! `-32603` [`JsonRpcResponse`].

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Primary session header, sent on requests and read from responses.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Fallback session header, only read from responses.
pub const FALLBACK_SESSION_HEADER: &str = "X-Session-Id";

/// Default request timeout, long enough for slow image generation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Number of body characters kept in HTTP status error messages.
const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// Configuration for HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Endpoint URL of the MCP server.
    pub url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Extra static headers.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Create a new HTTP transport config with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Blocking HTTP transport with session affinity.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    config: HttpTransportConfig,
    session_id: Option<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// Validates the URL and builds a client that ignores proxy settings from
    /// the environment; session affinity to the server address breaks when
    /// requests are relayed.
    pub fn connect(mut config: HttpTransportConfig) -> Result<Self> {
        config.url = config.url.trim_end_matches('/').to_string();

        url::Url::parse(&config.url)
            .map_err(|e| McpError::transport(format!("invalid URL: {}", e)))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| McpError::transport(format!("invalid header name: {}", key)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| McpError::transport(format!("invalid header value for {}", key)))?;
            headers.insert(name, value);
        }

        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            url = %config.url,
            timeout_secs = config.timeout.as_secs(),
            "created HTTP transport"
        );

        Ok(Self {
            client,
            config,
            session_id: None,
        })
    }

    /// Endpoint URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Current session id, if the server has issued one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Send one request and return the normalized response.
    pub fn send(&mut self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let body = match serde_json::to_string(request) {
            Ok(body) => body,
            Err(e) => return JsonRpcResponse::internal_error(format!("Request failed: {}", e)),
        };

        tracing::trace!(
            url = %self.config.url,
            json = %body,
            "sending MCP HTTP request"
        );

        let mut req = self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(session) = &self.session_id {
            req = req.header(SESSION_HEADER, session);
        }

        let resp = match req.send() {
            Ok(resp) => resp,
            Err(e) => {
                let detail = error_chain(&e);
                tracing::warn!(
                    method = %request.method,
                    error = %detail,
                    "MCP HTTP request failed"
                );
                return JsonRpcResponse::internal_error(format!("Request failed: {}", detail));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            tracing::warn!(
                method = %request.method,
                status = status.as_u16(),
                "MCP server returned non-success status"
            );
            return JsonRpcResponse::internal_error(status_error_message(status.as_u16(), &body));
        }

        self.capture_session(resp.headers());

        let text = match resp.text() {
            Ok(text) => text,
            Err(e) => {
                return JsonRpcResponse::internal_error(format!(
                    "Request failed: failed to read response body: {}",
                    error_chain(&e)
                ));
            }
        };

        tracing::trace!(json = %text, "received MCP HTTP response");

        match serde_json::from_str::<JsonRpcResponse>(&text) {
            Ok(response) => response.normalized(),
            Err(e) => JsonRpcResponse::internal_error(format!(
                "Request failed: invalid JSON response: {}",
                e
            )),
        }
    }

    /// Adopt the session id carried by a successful response, if any.
    fn capture_session(&mut self, headers: &HeaderMap) {
        let Some(session) = session_from_headers(headers) else {
            return;
        };

        if self.session_id.as_deref() != Some(session) {
            tracing::debug!(
                previous = ?self.session_id,
                session_id = %session,
                "MCP session id updated"
            );
            self.session_id = Some(session.to_string());
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.config.url)
            .field("timeout", &self.config.timeout)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// First non-empty session header, checking the primary name first.
fn session_from_headers(headers: &HeaderMap) -> Option<&str> {
    [SESSION_HEADER, FALLBACK_SESSION_HEADER]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.is_empty())
}

fn status_error_message(status: u16, body: &str) -> String {
    let mut message = format!("HTTP {}", status);
    if !body.is_empty() {
        message.push_str(": ");
        message.extend(body.chars().take(ERROR_BODY_PREVIEW_CHARS));
    }
    message
}

/// Render an error with its sources, reqwest hides the useful part in them.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}
