//! JSON-RPC 2.0 envelope and MCP payload types.
//!
//! Only the request/response subset used by the image server is modelled:
//! no batching, no notifications.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version sent by `initialize` when none is given.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

// ─────────────────────────────────────────────────────────────────────────────
// JSON-RPC Base Types
// ─────────────────────────────────────────────────────────────────────────────

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Correlation id, a fresh UUID per request.
    pub id: String,
    /// Method name to call.
    pub method: String,
    /// Method parameters (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Create a request with a freshly generated id.
    pub fn with_generated_id(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), method, params)
    }
}

/// A JSON-RPC response.
///
/// Every client operation returns this shape. Transport failures are
/// synthesized locally as error responses without an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version.
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Request id this response answers; `None` for local errors.
    #[serde(
        default,
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// Accept string or numeric ids; anything else reads as no id.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response that was never sent over the wire.
    pub fn local_error(code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            result: None,
            error: Some(JsonRpcError::new(code, message)),
        }
    }

    /// Local `-32603` error used for every transport failure.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::local_error(JsonRpcError::INTERNAL_ERROR, message)
    }

    /// Local `-32602` error used for argument validation.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::local_error(JsonRpcError::INVALID_PARAMS, message)
    }

    /// Enforce the one-of `result`/`error` shape on a decoded response.
    ///
    /// `error` wins when both are present; a missing `result` on a
    /// non-error response becomes `null`.
    pub fn normalized(mut self) -> Self {
        if self.error.is_some() {
            self.result = None;
        } else if self.result.is_none() {
            self.result = Some(Value::Null);
        }
        self
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Error code, if this is an error response.
    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Get the result, or the error if this is an error response.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }

    /// Text of the first content item of a `tools/call` result.
    ///
    /// Returns `None` when the result is missing, has no content, the first
    /// item has no string `text`, or that text is empty.
    pub fn first_text(&self) -> Option<&str> {
        self.result
            .as_ref()?
            .get("content")?
            .as_array()?
            .first()?
            .get("text")?
            .as_str()
            .filter(|text| !text.is_empty())
    }

    /// Decode the result as a `tools/call` payload.
    pub fn tool_result(&self) -> Option<CallToolResult> {
        self.result
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes
impl JsonRpcError {
    /// Parse error - Invalid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Invalid Request - Not a valid Request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Create an error object without data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP Protocol Types
// ─────────────────────────────────────────────────────────────────────────────

/// Client info sent during initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl ClientInfo {
    /// Create client info.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version.
    pub protocol_version: String,
    /// Client capabilities, opaque to this client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    /// Client info.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_info: Option<ClientInfo>,
}

impl InitializeParams {
    /// Build handshake params; empty capability objects are dropped.
    pub fn new(
        protocol_version: Option<&str>,
        capabilities: Option<Value>,
        client_info: Option<ClientInfo>,
    ) -> Self {
        let capabilities = capabilities.filter(|caps| match caps {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        });

        Self {
            protocol_version: protocol_version
                .unwrap_or(MCP_PROTOCOL_VERSION)
                .to_string(),
            capabilities,
            client_info,
        }
    }
}

/// A tool definition from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Result of the tools/list request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// List of available tools.
    pub tools: Vec<ToolInfo>,
}

/// Parameters for the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to call.
    pub name: String,
    /// Tool-specific arguments, passed through unvalidated.
    pub arguments: Value,
}

/// Content item in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Content type, usually "text".
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Text payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Result of the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Whether the tool reported a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Check if the tool call was an error.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}
