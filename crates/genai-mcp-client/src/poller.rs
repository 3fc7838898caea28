//! Polling of asynchronous provider tasks.
//!
//! Asynchronous tools hand back a task id straight away and finish later.
//! [`poll_task`] queries a status tool until the task reaches a terminal
//! state or the attempt budget runs out.
//!
//! Status payloads are free-form JSON text and their shape differs between
//! provider tool versions, so the status is probed in several places:
//!
//! ```text
//! output.task_status  output.status  output.state
//! result.task_status  result.status  result.state
//! data.task_status    data.status    data.state
//! task_status         status         state
//! ```
//!
//! The first non-empty string wins. It is lower-cased and matched (exactly or
//! by prefix) against the success and failure vocabularies below; anything
//! else means the task is still running.

use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

use crate::client::{SessionClient, ToolCaller};
use crate::protocol::JsonRpcResponse;

/// Status values (and prefixes) that mean the task finished successfully.
pub const SUCCESS_STATUSES: [&str; 5] = ["succeeded", "success", "finished", "done", "completed"];

/// Status values (and prefixes) that mean the task failed or was cancelled.
pub const FAILURE_STATUSES: [&str; 4] = ["failed", "error", "canceled", "cancelled"];

/// Objects that may wrap the status fields, in probe order.
const STATUS_CONTAINERS: [&str; 3] = ["output", "result", "data"];

/// Status field names, in probe order.
const STATUS_FIELDS: [&str; 3] = ["task_status", "status", "state"];

// ─────────────────────────────────────────────────────────────────────────────
// Task status
// ─────────────────────────────────────────────────────────────────────────────

/// Normalized task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Any status outside the terminal vocabularies.
    Running,
    /// Terminal success.
    Succeeded,
    /// Terminal failure or cancellation.
    Failed,
    /// No status could be read from the response.
    Unknown,
}

impl TaskStatus {
    /// Classify a raw status string from the provider.
    pub fn classify(raw: &str) -> Self {
        let normalized = raw.to_lowercase();
        if matches_vocabulary(&normalized, &SUCCESS_STATUSES) {
            Self::Succeeded
        } else if matches_vocabulary(&normalized, &FAILURE_STATUSES) {
            Self::Failed
        } else {
            Self::Running
        }
    }

    /// Whether the task will not change any more.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

fn matches_vocabulary(normalized: &str, vocabulary: &[&str]) -> bool {
    vocabulary.iter().any(|word| normalized.starts_with(word))
}

/// Find the raw status string in a status payload.
///
/// Returns `None` when `text` is not JSON, not an object, or carries no
/// non-empty string status in any probed location.
pub fn extract_status(text: &str) -> Option<String> {
    let document: Value = serde_json::from_str(text).ok()?;
    let root = document.as_object()?;

    STATUS_CONTAINERS
        .iter()
        .filter_map(|container| root.get(*container).and_then(Value::as_object))
        .chain(std::iter::once(root))
        .find_map(|object| {
            STATUS_FIELDS
                .iter()
                .filter_map(|field| object.get(*field).and_then(Value::as_str))
                .find(|status| !status.is_empty())
        })
        .map(str::to_string)
}

/// What one status-query response says about the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReading {
    /// A status string was found and classified.
    Recognized {
        /// Classified status.
        status: TaskStatus,
        /// Status exactly as the provider sent it.
        raw: String,
    },
    /// No content text, invalid JSON, or no status field.
    Unparsed,
}

impl StatusReading {
    /// Inspect the first content text of a `tools/call` response.
    pub fn from_response(response: &JsonRpcResponse) -> Self {
        response
            .first_text()
            .and_then(extract_status)
            .map_or(Self::Unparsed, |raw| Self::Recognized {
                status: TaskStatus::classify(&raw),
                raw,
            })
    }

    /// Status, with [`TaskStatus::Unknown`] for unparsed responses.
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Recognized { status, .. } => *status,
            Self::Unparsed => TaskStatus::Unknown,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Polling
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque id of a server-side task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Wrap a task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the id from text of the form `"<prefix> <id>"`.
    ///
    /// Returns `None` unless `text` starts with exactly `prefix`.
    pub fn from_prefixed(text: &str, prefix: &str) -> Option<Self> {
        text.strip_prefix(prefix).map(|id| Self::new(id.trim()))
    }

    /// The task id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attempt budget for one polling sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Maximum number of status queries.
    pub max_attempts: u32,
    /// Delay between status queries.
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

impl PollOptions {
    /// Create poll options.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// How a polling sequence ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The task reported a success status.
    Succeeded(JsonRpcResponse),
    /// The task reported a failure or cancellation status.
    Failed(JsonRpcResponse),
    /// A query returned a JSON-RPC error; polling stopped there.
    ProtocolError(JsonRpcResponse),
    /// The attempt budget ran out before a terminal status.
    Exhausted {
        /// Number of attempts allowed.
        attempts: u32,
        /// Last response received, if any query was made.
        last: Option<JsonRpcResponse>,
    },
}

impl PollOutcome {
    /// Collapse into the response handed to callers.
    ///
    /// Exhaustion yields the last response as is; only a sequence that made
    /// no query at all produces a synthesized `-32603` error.
    pub fn into_response(self) -> JsonRpcResponse {
        match self {
            Self::Succeeded(response) | Self::Failed(response) | Self::ProtocolError(response) => {
                response
            }
            Self::Exhausted {
                last: Some(response),
                ..
            } => response,
            Self::Exhausted {
                attempts,
                last: None,
            } => JsonRpcResponse::internal_error(format!(
                "task polling exceeded max attempts ({})",
                attempts
            )),
        }
    }

    /// Whether the task reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

/// Poll `query_tool` until the task is terminal, returning the outcome.
pub fn poll_task_outcome<C>(
    caller: &mut C,
    query_tool: &str,
    task: &TaskHandle,
    options: PollOptions,
) -> PollOutcome
where
    C: ToolCaller + ?Sized,
{
    let mut last = None;

    for attempt in 1..=options.max_attempts {
        let response = caller.call_tool(query_tool, json!({ "task_id": task.as_str() }));

        if response.is_error() {
            return PollOutcome::ProtocolError(response);
        }

        let reading = StatusReading::from_response(&response);
        tracing::debug!(
            tool = %query_tool,
            task_id = %task,
            attempt,
            status = %reading.status(),
            "polled task status"
        );

        match reading.status() {
            TaskStatus::Succeeded => return PollOutcome::Succeeded(response),
            TaskStatus::Failed => return PollOutcome::Failed(response),
            TaskStatus::Running | TaskStatus::Unknown => {}
        }

        last = Some(response);

        if attempt < options.max_attempts && !options.interval.is_zero() {
            thread::sleep(options.interval);
        }
    }

    tracing::warn!(
        tool = %query_tool,
        task_id = %task,
        max_attempts = options.max_attempts,
        "task polling exhausted without a terminal status"
    );

    PollOutcome::Exhausted {
        attempts: options.max_attempts,
        last,
    }
}

/// Poll `query_tool` for `task_id` and return the final response.
pub fn poll_task<C>(
    caller: &mut C,
    query_tool: &str,
    task_id: &str,
    options: PollOptions,
) -> JsonRpcResponse
where
    C: ToolCaller + ?Sized,
{
    poll_task_outcome(caller, query_tool, &TaskHandle::new(task_id), options).into_response()
}

impl SessionClient {
    /// Poll an asynchronous task through this client's session.
    pub fn poll_task(
        &mut self,
        query_tool: &str,
        task_id: &str,
        options: PollOptions,
    ) -> JsonRpcResponse {
        poll_task(self, query_tool, task_id, options)
    }
}
