//! Provider-specific image flows.
//!
//! Each provider exposes its image operations either as one synchronous tool
//! or as a create/query tool pair. The differences are pure data, kept in a
//! static [`ProviderRoutes`] table per provider; [`ImageClient`] runs
//! whichever flow the table names.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::client::{SessionClient, ToolCaller};
use crate::config::ClientConfig;
use crate::error::{McpError, Result};
use crate::poller::{PollOptions, TaskHandle, poll_task_outcome};
use crate::protocol::JsonRpcResponse;

// ─────────────────────────────────────────────────────────────────────────────
// Provider table
// ─────────────────────────────────────────────────────────────────────────────

/// Upstream image service behind the MCP server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    /// Google Gemini, synchronous tools.
    #[default]
    Gemini,
    /// Alibaba Bailian Wanxiang, asynchronous single-image tasks.
    Wan,
    /// APIMart, asynchronous tasks with multi-image edits.
    Apimart,
}

impl Provider {
    /// All known providers.
    pub const ALL: [Provider; 3] = [Provider::Gemini, Provider::Wan, Provider::Apimart];

    /// Configuration identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Wan => "wan",
            Self::Apimart => "apimart",
        }
    }

    /// Name used in user-facing messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::Wan => "Wan",
            Self::Apimart => "APIMart",
        }
    }

    /// Tool routing for this provider.
    pub fn routes(self) -> &'static ProviderRoutes {
        match self {
            Self::Gemini => &GEMINI_ROUTES,
            Self::Wan => &WAN_ROUTES,
            Self::Apimart => &APIMART_ROUTES,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| McpError::UnknownProvider(s.to_string()))
    }
}

impl TryFrom<String> for Provider {
    type Error = McpError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_string()
    }
}

/// How one image operation is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRoute {
    /// A single synchronous tool call.
    Direct {
        /// Tool to call.
        tool: &'static str,
    },
    /// Create a task, then poll it.
    Task(TaskRoute),
}

/// Create/query tool pair of an asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRoute {
    /// Tool that starts the task.
    pub create_tool: &'static str,
    /// Tool that reports task status.
    pub query_tool: &'static str,
    /// Literal prefix before the task id in the create tool's text.
    pub task_id_prefix: &'static str,
}

/// Routing table entry for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderRoutes {
    /// Text-to-image generation.
    pub generate: ToolRoute,
    /// Image editing.
    pub edit: ToolRoute,
    /// Edit accepts a JSON array of images (`image_urls`); otherwise only the
    /// first URL is sent as `image_url`.
    pub supports_multi_image: bool,
}

const GENERATE_TASK_PREFIX: &str = "generate_image task_id:";
const EDIT_TASK_PREFIX: &str = "edit_image task_id:";

static GEMINI_ROUTES: ProviderRoutes = ProviderRoutes {
    generate: ToolRoute::Direct {
        tool: "gemini_generate_image",
    },
    edit: ToolRoute::Direct {
        tool: "gemini_edit_image",
    },
    supports_multi_image: true,
};

static WAN_ROUTES: ProviderRoutes = ProviderRoutes {
    generate: ToolRoute::Task(TaskRoute {
        create_tool: "wan_create_generate_image_task",
        query_tool: "wan_query_generate_image_task",
        task_id_prefix: GENERATE_TASK_PREFIX,
    }),
    edit: ToolRoute::Task(TaskRoute {
        create_tool: "wan_create_edit_image_task",
        query_tool: "wan_query_edit_image_task",
        task_id_prefix: EDIT_TASK_PREFIX,
    }),
    supports_multi_image: false,
};

static APIMART_ROUTES: ProviderRoutes = ProviderRoutes {
    generate: ToolRoute::Task(TaskRoute {
        create_tool: "apimart_create_generate_image_task",
        query_tool: "apimart_query_generate_image_task",
        task_id_prefix: GENERATE_TASK_PREFIX,
    }),
    edit: ToolRoute::Task(TaskRoute {
        create_tool: "apimart_create_edit_image_task",
        query_tool: "apimart_query_edit_image_task",
        task_id_prefix: EDIT_TASK_PREFIX,
    }),
    supports_multi_image: true,
};

// ─────────────────────────────────────────────────────────────────────────────
// Task creation
// ─────────────────────────────────────────────────────────────────────────────

/// What a create-task response turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum CreatedTask {
    /// The text carried the expected prefix and a task id.
    Handle(TaskHandle),
    /// Anything else; handed back untouched for the caller to inspect.
    Unparsed(JsonRpcResponse),
}

impl CreatedTask {
    /// Read the task id from the first content text after `prefix`.
    pub fn from_response(response: JsonRpcResponse, prefix: &str) -> Self {
        let handle = response
            .first_text()
            .and_then(|text| TaskHandle::from_prefixed(text, prefix));
        match handle {
            Some(handle) => Self::Handle(handle),
            None => Self::Unparsed(response),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Image client
// ─────────────────────────────────────────────────────────────────────────────

/// Runs image operations through the configured provider's tools.
#[derive(Debug)]
pub struct ImageClient<C = SessionClient> {
    caller: C,
    provider: Provider,
    poll: PollOptions,
}

impl ImageClient<SessionClient> {
    /// Create a session client from `config` and wrap it.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let poll = config.poll.options()?;
        let session = SessionClient::new(config)?;
        Ok(Self::with_caller(session, config.provider, poll))
    }

    /// Handshake with the configured protocol version and client info.
    pub fn initialize(&mut self) -> JsonRpcResponse {
        self.caller.initialize_default()
    }
}

impl<C: ToolCaller> ImageClient<C> {
    /// Wrap an existing tool caller.
    pub fn with_caller(caller: C, provider: Provider, poll: PollOptions) -> Self {
        Self {
            caller,
            provider,
            poll,
        }
    }

    /// Selected provider.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Poll settings used for asynchronous providers.
    pub fn poll_options(&self) -> PollOptions {
        self.poll
    }

    /// Underlying tool caller.
    pub fn caller(&self) -> &C {
        &self.caller
    }

    /// Underlying tool caller, mutably.
    pub fn caller_mut(&mut self) -> &mut C {
        &mut self.caller
    }

    /// Unwrap the tool caller.
    pub fn into_inner(self) -> C {
        self.caller
    }

    /// Generate an image from a text prompt.
    pub fn generate_image(&mut self, prompt: &str) -> JsonRpcResponse {
        let route = self.provider.routes().generate;
        self.run(route, json!({ "prompt": prompt }))
    }

    /// Edit images according to a prompt.
    ///
    /// Providers without multi-image support only receive the first URL and
    /// reject an empty list with a local `-32602` error, before any request.
    pub fn edit_image<S: AsRef<str>>(&mut self, prompt: &str, image_urls: &[S]) -> JsonRpcResponse {
        let routes = self.provider.routes();

        let arguments = if routes.supports_multi_image {
            let urls: Vec<&str> = image_urls.iter().map(|url| url.as_ref()).collect();
            json!({ "prompt": prompt, "image_urls": json!(urls).to_string() })
        } else {
            let Some(first) = image_urls.first() else {
                return JsonRpcResponse::invalid_params(format!(
                    "At least one image URL is required for {} edit_image",
                    self.provider.display_name()
                ));
            };
            if image_urls.len() > 1 {
                tracing::debug!(
                    provider = %self.provider,
                    ignored = image_urls.len() - 1,
                    "provider accepts a single image, extra URLs ignored"
                );
            }
            json!({ "prompt": prompt, "image_url": first.as_ref() })
        };

        self.run(routes.edit, arguments)
    }

    fn run(&mut self, route: ToolRoute, arguments: Value) -> JsonRpcResponse {
        match route {
            ToolRoute::Direct { tool } => self.caller.call_tool(tool, arguments),
            ToolRoute::Task(task) => self.create_then_poll(task, arguments),
        }
    }

    fn create_then_poll(&mut self, route: TaskRoute, arguments: Value) -> JsonRpcResponse {
        let created = self.caller.call_tool(route.create_tool, arguments);
        if created.is_error() {
            return created;
        }

        let handle = match CreatedTask::from_response(created, route.task_id_prefix) {
            CreatedTask::Handle(handle) => handle,
            CreatedTask::Unparsed(response) => {
                tracing::warn!(
                    tool = %route.create_tool,
                    "create-task response did not carry a task id, returning it as is"
                );
                return response;
            }
        };

        tracing::info!(
            provider = %self.provider,
            task_id = %handle,
            query_tool = %route.query_tool,
            "task created, polling for completion"
        );

        poll_task_outcome(&mut self.caller, route.query_tool, &handle, self.poll).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::poller::tests::{ScriptedCaller, status_response, text_response};
    use crate::protocol::JsonRpcError;

    fn client(provider: Provider, responses: Vec<JsonRpcResponse>) -> ImageClient<ScriptedCaller> {
        ImageClient::with_caller(
            ScriptedCaller::new(responses),
            provider,
            PollOptions::new(5, Duration::ZERO),
        )
    }

    #[test]
    fn test_provider_parse_case_insensitive() {
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("WAN".parse::<Provider>().unwrap(), Provider::Wan);
        assert_eq!(" ApiMart ".parse::<Provider>().unwrap(), Provider::Apimart);
        assert!(matches!(
            "openai".parse::<Provider>(),
            Err(McpError::UnknownProvider(_))
        ));
        assert_eq!(Provider::default(), Provider::Gemini);
    }

    #[test]
    fn test_provider_serde() {
        let value = serde_json::to_value(Provider::Wan).unwrap();
        assert_eq!(value, json!("wan"));
        let provider: Provider = serde_json::from_value(json!("Gemini")).unwrap();
        assert_eq!(provider, Provider::Gemini);
        assert!(serde_json::from_value::<Provider>(json!("x")).is_err());
    }

    #[test]
    fn test_routes_table() {
        let wan = Provider::Wan.routes();
        assert!(!wan.supports_multi_image);
        assert_eq!(
            wan.generate,
            ToolRoute::Task(TaskRoute {
                create_tool: "wan_create_generate_image_task",
                query_tool: "wan_query_generate_image_task",
                task_id_prefix: "generate_image task_id:",
            })
        );
        assert_eq!(
            Provider::Gemini.routes().edit,
            ToolRoute::Direct {
                tool: "gemini_edit_image"
            }
        );
        assert!(Provider::Apimart.routes().supports_multi_image);
    }

    #[test]
    fn test_created_task_from_response() {
        let created = CreatedTask::from_response(
            text_response("edit_image task_id: 0f9e-77"),
            "edit_image task_id:",
        );
        assert_eq!(created, CreatedTask::Handle(TaskHandle::new("0f9e-77")));

        let raw = text_response("task queued as 0f9e-77");
        let created = CreatedTask::from_response(raw.clone(), "edit_image task_id:");
        assert_eq!(created, CreatedTask::Unparsed(raw));
    }

    #[test]
    fn test_gemini_generate_is_single_call() {
        let reply = text_response("https://cdn.example.com/out.png");
        let mut client = client(Provider::Gemini, vec![reply.clone()]);

        let response = client.generate_image("a red fox");

        assert_eq!(response, reply);
        let calls = &client.caller().calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "gemini_generate_image");
        assert_eq!(calls[0].1, json!({ "prompt": "a red fox" }));
    }

    #[test]
    fn test_gemini_edit_sends_json_array_of_all_urls() {
        let mut client = client(Provider::Gemini, vec![text_response("ok")]);

        client.edit_image("make it blue", &["https://a/1.png", "data:image/png;base64,AAAA"]);

        let (name, arguments) = &client.caller().calls[0];
        assert_eq!(name, "gemini_edit_image");
        assert_eq!(arguments["prompt"], "make it blue");
        let encoded = arguments["image_urls"].as_str().unwrap();
        let urls: Vec<String> = serde_json::from_str(encoded).unwrap();
        assert_eq!(urls, vec!["https://a/1.png", "data:image/png;base64,AAAA"]);
    }

    #[test]
    fn test_wan_generate_creates_then_polls() {
        let mut client = client(
            Provider::Wan,
            vec![
                text_response("generate_image task_id: task-42"),
                status_response("PENDING", 1),
                status_response("RUNNING", 2),
                status_response("SUCCEEDED", 3),
            ],
        );
        let expected = client.caller().responses[3].clone();

        let response = client.generate_image("a lighthouse at dusk");

        assert_eq!(response, expected);
        let calls = &client.caller().calls;
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].0, "wan_create_generate_image_task");
        assert_eq!(calls[0].1, json!({ "prompt": "a lighthouse at dusk" }));
        for (name, arguments) in &calls[1..] {
            assert_eq!(name, "wan_query_generate_image_task");
            assert_eq!(arguments, &json!({ "task_id": "task-42" }));
        }
    }

    #[test]
    fn test_create_error_is_returned_without_polling() {
        let failure = JsonRpcResponse::internal_error("HTTP 502: bad gateway");
        let mut client = client(Provider::Wan, vec![failure.clone()]);

        assert_eq!(client.generate_image("x"), failure);
        assert_eq!(client.caller().calls.len(), 1);
    }

    #[test]
    fn test_unexpected_prefix_passthrough() {
        let raw = text_response("failed to create generate-image task: quota exceeded");
        let mut client = client(Provider::Wan, vec![raw.clone(), status_response("SUCCEEDED", 1)]);

        let response = client.generate_image("x");

        assert_eq!(response, raw);
        assert_eq!(client.caller().calls.len(), 1);
    }

    #[test]
    fn test_wan_edit_requires_an_image() {
        let mut client = client(Provider::Wan, vec![text_response("edit_image task_id: t")]);

        let response = client.edit_image::<&str>("make it blue", &[]);

        let error = response.error.expect("expected validation error");
        assert_eq!(error.code, JsonRpcError::INVALID_PARAMS);
        assert!(error.message.contains("At least one image URL"));
        assert!(error.message.contains("Wan"));
        assert!(client.caller().calls.is_empty());
    }

    #[test]
    fn test_wan_edit_uses_first_url_only() {
        let mut client = client(
            Provider::Wan,
            vec![
                text_response("edit_image task_id: e-1"),
                status_response("FAILED", 1),
            ],
        );
        let expected = client.caller().responses[1].clone();

        let urls = vec!["https://a/1.png".to_string(), "https://a/2.png".to_string()];
        let response = client.edit_image("make it blue", urls.as_slice());

        assert_eq!(response, expected);
        let calls = &client.caller().calls;
        assert_eq!(calls[0].0, "wan_create_edit_image_task");
        assert_eq!(
            calls[0].1,
            json!({ "prompt": "make it blue", "image_url": "https://a/1.png" })
        );
        assert_eq!(calls[1].0, "wan_query_edit_image_task");
        assert_eq!(calls[1].1, json!({ "task_id": "e-1" }));
    }

    #[test]
    fn test_apimart_edit_polls_data_status() {
        let done = text_response(
            r#"{"code":200,"data":{"status":"completed","result":{"images":[{"url":["https://x/y.png"]}]}}}"#,
        );
        let mut client = client(
            Provider::Apimart,
            vec![
                text_response("edit_image task_id: task_01K8"),
                text_response(r#"{"code":200,"data":{"status":"processing"}}"#),
                done.clone(),
            ],
        );

        let response = client.edit_image("add a hat", &["https://a/1.png", "https://a/2.png"]);

        assert_eq!(response, done);
        let calls = &client.caller().calls;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, "apimart_create_edit_image_task");
        assert!(calls[0].1["image_urls"].as_str().unwrap().contains("https://a/2.png"));
        assert_eq!(calls[2].0, "apimart_query_edit_image_task");
    }

    #[test]
    fn test_polling_exhaustion_returns_last_status() {
        let mut client = ImageClient::with_caller(
            ScriptedCaller::new(vec![
                text_response("generate_image task_id: slow"),
                status_response("QUEUED", 1),
                status_response("QUEUED", 2),
            ]),
            Provider::Apimart,
            PollOptions::new(2, Duration::ZERO),
        );
        let last = client.caller().responses[2].clone();

        assert_eq!(client.generate_image("x"), last);
        assert_eq!(client.caller().calls.len(), 3);
    }
}
