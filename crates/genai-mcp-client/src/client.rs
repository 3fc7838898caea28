//! Session client for the MCP image server.

use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{
    CallToolParams, ClientInfo, InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ToolInfo,
};
use crate::transport::{HttpTransport, HttpTransportConfig};

/// Anything that can invoke a tool and hand back the raw response.
///
/// The poller and the provider flows only need this one call, so they are
/// written against the trait rather than the HTTP client.
pub trait ToolCaller {
    /// Invoke `tools/call` with the given tool name and arguments.
    fn call_tool(&mut self, name: &str, arguments: Value) -> JsonRpcResponse;
}

/// A JSON-RPC client bound to one MCP server endpoint.
///
/// Calls are strictly sequential; the server-issued session id is kept
/// between calls, so reuse one client for a whole conversation.
#[derive(Debug)]
pub struct SessionClient {
    transport: HttpTransport,
    protocol_version: String,
    client_info: ClientInfo,
}

impl SessionClient {
    /// Create a client from configuration. No request is sent.
    ///
    /// The configuration is validated first, so a zero timeout or a bad poll
    /// interval is rejected here rather than on the first request.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut http = HttpTransportConfig::new(config.base_url.clone())
            .with_timeout(config.timeout());
        for (key, value) in &config.headers {
            http = http.with_header(key, value);
        }

        let transport = HttpTransport::connect(http)?;

        tracing::info!(
            url = %transport.url(),
            provider = %config.provider,
            "created MCP session client"
        );

        Ok(Self {
            transport,
            protocol_version: config.protocol_version.clone(),
            client_info: config.client_info.clone(),
        })
    }

    /// Create a client for `base_url` with default settings.
    pub fn connect(base_url: impl Into<String>) -> Result<Self> {
        Self::new(&ClientConfig::default().with_base_url(base_url))
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Session id issued by the server, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.transport.session_id()
    }

    /// Send one JSON-RPC call and return the normalized response.
    pub fn send_request(&mut self, method: &str, params: Option<Value>) -> JsonRpcResponse {
        let request = JsonRpcRequest::with_generated_id(method, params);
        tracing::debug!(method = %method, id = %request.id, "sending JSON-RPC request");
        self.transport.send(&request)
    }

    /// Perform the `initialize` handshake.
    ///
    /// `protocol_version` falls back to [`MCP_PROTOCOL_VERSION`]. Safe to
    /// call more than once; the newest session header wins.
    ///
    /// [`MCP_PROTOCOL_VERSION`]: crate::protocol::MCP_PROTOCOL_VERSION
    pub fn initialize(
        &mut self,
        protocol_version: Option<&str>,
        capabilities: Option<Value>,
        client_info: Option<ClientInfo>,
    ) -> JsonRpcResponse {
        let params = InitializeParams::new(protocol_version, capabilities, client_info);
        let params = match serde_json::to_value(&params) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::internal_error(format!("Request failed: {}", e)),
        };

        let response = self.send_request("initialize", Some(params));

        if let Some(info) = response.result.as_ref().and_then(|r| r.get("serverInfo")) {
            let server = info.get("name").and_then(Value::as_str).unwrap_or("unknown");
            let version = info.get("version").and_then(Value::as_str).unwrap_or("unknown");
            tracing::info!(
                server = %server,
                version = %version,
                session_id = ?self.session_id(),
                "MCP session initialized"
            );
        }

        response
    }

    /// Handshake using the configured protocol version and client info.
    pub fn initialize_default(&mut self) -> JsonRpcResponse {
        let version = self.protocol_version.clone();
        let info = self.client_info.clone();
        self.initialize(Some(&version), None, Some(info))
    }

    /// List the server's tools (`tools/list`).
    pub fn list_tools(&mut self) -> JsonRpcResponse {
        self.send_request("tools/list", None)
    }

    /// Invoke a tool (`tools/call`). Arguments are passed through as given.
    pub fn call_tool(&mut self, name: &str, arguments: Value) -> JsonRpcResponse {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let params = match serde_json::to_value(&params) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::internal_error(format!("Request failed: {}", e)),
        };
        let response = self.send_request("tools/call", Some(params));

        if let Some(error) = &response.error {
            tracing::warn!(tool = %name, error = %error, "tool call failed");
        } else if response.tool_result().is_some_and(|r| r.is_error()) {
            tracing::warn!(tool = %name, "tool call returned error");
        } else {
            tracing::debug!(tool = %name, "tool call succeeded");
        }

        response
    }

    /// List the server's tools and decode the descriptors.
    pub fn list_tools_typed(&mut self) -> std::result::Result<Vec<ToolInfo>, JsonRpcError> {
        let result = self.list_tools().into_result()?;
        let list: ListToolsResult = serde_json::from_value(result).map_err(|e| {
            JsonRpcError::new(
                JsonRpcError::INTERNAL_ERROR,
                format!("invalid tools/list result: {}", e),
            )
        })?;

        tracing::debug!(tool_count = list.tools.len(), "listed MCP tools");
        Ok(list.tools)
    }
}

impl ToolCaller for SessionClient {
    fn call_tool(&mut self, name: &str, arguments: Value) -> JsonRpcResponse {
        SessionClient::call_tool(self, name, arguments)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::error::McpError;
    use crate::provider::Provider;

    #[test]
    fn test_new_from_config() {
        let config = ClientConfig::default()
            .with_base_url("http://127.0.0.1:9000/mcp/")
            .with_provider(Provider::Wan);
        let client = SessionClient::new(&config).unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:9000/mcp");
        assert!(client.session_id().is_none());
    }

    #[test]
    fn test_connect_invalid_url() {
        assert!(SessionClient::connect("::not a url::").is_err());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ClientConfig::default().with_timeout(Duration::ZERO);
        let err = SessionClient::new(&config).unwrap_err();
        assert!(matches!(err, McpError::Config(_)));

        let mut config = ClientConfig::default();
        config.poll.interval_secs = f64::NAN;
        assert!(matches!(SessionClient::new(&config), Err(McpError::Config(_))));
    }

    #[test]
    fn test_new_keeps_sub_second_timeout_usable() {
        let config = ClientConfig::default().with_timeout(Duration::from_millis(500));
        assert!(SessionClient::new(&config).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_reads_server_info() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "initialize" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Mcp-Session-Id", "init-session")
                    .set_body_json(json!({
                        "jsonrpc": "2.0",
                        "id": "1",
                        "result": {
                            "protocolVersion": "2024-11-05",
                            "serverInfo": { "name": "genai-mcp", "version": "1.0.0" }
                        }
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/mcp", server.uri());
        let (response, session) = tokio::task::spawn_blocking(move || {
            let mut client = SessionClient::connect(url).unwrap();
            let response = client.initialize_default();
            (response, client.session_id().map(str::to_string))
        })
        .await
        .unwrap();

        assert!(!response.is_error());
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "genai-mcp");
        assert_eq!(result["serverInfo"]["version"], "1.0.0");
        assert_eq!(session.as_deref(), Some("init-session"));
    }

    #[test]
    fn test_send_request_connection_refused() {
        // Reserve a port, then free it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = SessionClient::connect(format!("http://127.0.0.1:{}/mcp", port)).unwrap();
        let response = client.list_tools();

        let error = response.error.expect("expected error response");
        assert_eq!(error.code, JsonRpcError::INTERNAL_ERROR);
        assert!(error.message.contains("Request failed"));
        assert!(response.result.is_none());
        assert!(client.session_id().is_none());
    }
}
