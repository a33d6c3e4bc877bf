use scholar_model::{ErrorKind, ToolCallRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

impl PresetEvent {
    /// Shorthand for a text delta.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        PresetEvent::MessageDelta(text.into())
    }

    /// Shorthand for a tool call with `{"query": query}` arguments.
    pub fn lookup(id: &str, tool: &str, query: &str) -> Self {
        Self::tool_call(id, tool, serde_json::json!({ "query": query }))
    }

    /// Shorthand for a tool call with arbitrary arguments.
    pub fn tool_call(id: &str, tool: &str, arguments: Value) -> Self {
        PresetEvent::ToolCall(ToolCallRequest {
            id: id.to_owned(),
            name: tool.to_owned(),
            arguments,
        })
    }
}

/// The preset response for one model request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request fails this many times before the events are
    /// delivered. `Some(0)` means the request always fails.
    pub failures: Option<u64>,
    /// The error kind reported by injected failures.
    #[serde(default = "default_failure_kind")]
    pub failure_kind: ErrorKind,
}

fn default_failure_kind() -> ErrorKind {
    ErrorKind::Other
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
            failure_kind: default_failure_kind(),
        }
    }

    /// A plain text answer delivered in a single delta.
    #[inline]
    pub fn answer<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::text(text)])
    }

    /// A response that always fails with `kind`.
    #[inline]
    pub fn failing(kind: ErrorKind) -> Self {
        Self::with_events(Vec::new())
            .with_failures(0)
            .with_failure_kind(kind)
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Sets the error kind reported by injected failures.
    #[inline]
    pub fn with_failure_kind(mut self, kind: ErrorKind) -> Self {
        self.failure_kind = kind;
        self
    }

    pub(crate) fn has_tool_call(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)))
    }
}
