//! Message types for conversation state.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::{Result, ThreadlineError};

/// Metadata key holding the write-once RFC 3339 timestamp.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Argument key rewritten to the active thread identifier.
pub const USER_ID_ARG: &str = "user_id";

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[strum(to_string = "human", serialize = "user")]
    Human,
    #[strum(to_string = "ai", serialize = "assistant")]
    Assistant,
    Tool,
}

/// Message body: plain text or a structured payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<Value> for MessageContent {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => MessageContent::Text(text),
            other => MessageContent::Structured(other),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    /// Create a tool call with a fresh id.
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }

    /// Create a tool call from a JSON object; non-object values yield empty args.
    pub fn from_json(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, args)
    }
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolStatus {
    #[default]
    Success,
    Error,
}

/// Role-specific payload of a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Human,
    Assistant {
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: Option<String>,
        status: ToolStatus,
    },
}

/// A single conversation entry.
///
/// Serialized with a `type` tag (`human`, `ai`, `tool`). Deserialization also
/// accepts the `role` shorthand callers use for input payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage", into = "RawMessage")]
pub struct Message {
    pub id: Option<String>,
    pub content: MessageContent,
    pub metadata: Map<String, Value>,
    pub kind: MessageKind,
}

impl Message {
    fn with_kind(kind: MessageKind, content: MessageContent) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            content,
            metadata: Map::new(),
            kind,
        }
    }

    /// Create a human message.
    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self::with_kind(MessageKind::Human, content.into())
    }

    /// Create an assistant message without tool calls.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::with_kind(
            MessageKind::Assistant {
                tool_calls: Vec::new(),
            },
            content.into(),
        )
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_tool_calls(
        content: impl Into<MessageContent>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self::with_kind(MessageKind::Assistant { tool_calls }, content.into())
    }

    /// Create a tool result message answering `call`.
    pub fn tool_result(call: &ToolCall, content: impl Into<MessageContent>, status: ToolStatus) -> Self {
        Self::with_kind(
            MessageKind::Tool {
                tool_call_id: call.id.clone(),
                name: Some(call.name.clone()),
                status,
            },
            content.into(),
        )
    }

    /// Set the timestamp (builder style). Overwrites; meant for constructing fixtures.
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.metadata
            .insert(TIMESTAMP_KEY.to_string(), Value::String(format_timestamp(at)));
        self
    }

    pub fn role(&self) -> Role {
        match self.kind {
            MessageKind::Human => Role::Human,
            MessageKind::Assistant { .. } => Role::Assistant,
            MessageKind::Tool { .. } => Role::Tool,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self.kind, MessageKind::Human)
    }

    /// Text of the message; structured content is rendered as JSON.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Structured(value) => value.to_string(),
        }
    }

    /// Tool calls of an assistant message; empty for other roles.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.kind {
            MessageKind::Assistant { tool_calls } => tool_calls,
            _ => &[],
        }
    }

    pub fn tool_calls_mut(&mut self) -> Option<&mut Vec<ToolCall>> {
        match &mut self.kind {
            MessageKind::Assistant { tool_calls } => Some(tool_calls),
            _ => None,
        }
    }

    /// Parsed timestamp, if present and well-formed.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get(TIMESTAMP_KEY)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
    }

    /// Stamp the message with `at` unless it already carries a timestamp.
    ///
    /// Returns whether the message was stamped. A `timestamp` entry that is
    /// not a string means the state is malformed.
    pub fn stamp_if_absent(&mut self, at: DateTime<Utc>) -> Result<bool> {
        match self.metadata.get(TIMESTAMP_KEY) {
            Some(Value::String(_)) => Ok(false),
            Some(other) => Err(ThreadlineError::HookInconsistency(format!(
                "message {} has a non-string timestamp: {other}",
                self.id.as_deref().unwrap_or("<no id>")
            ))),
            None => {
                self.metadata
                    .insert(TIMESTAMP_KEY.to_string(), Value::String(format_timestamp(at)));
                Ok(true)
            }
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Flat wire shape shared by every role.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMessage {
    #[serde(rename = "type", alias = "role")]
    kind: String,
    #[serde(default)]
    content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<ToolStatus>,
}

impl TryFrom<RawMessage> for Message {
    type Error = String;

    fn try_from(raw: RawMessage) -> std::result::Result<Self, Self::Error> {
        let role: Role = raw
            .kind
            .parse()
            .map_err(|_| format!("unknown message type '{}'", raw.kind))?;
        let kind = match role {
            Role::Human => MessageKind::Human,
            Role::Assistant => MessageKind::Assistant {
                tool_calls: raw.tool_calls,
            },
            Role::Tool => MessageKind::Tool {
                tool_call_id: raw
                    .tool_call_id
                    .ok_or_else(|| "tool message without tool_call_id".to_string())?,
                name: raw.name,
                status: raw.status.unwrap_or_default(),
            },
        };
        Ok(Message {
            id: raw.id,
            content: raw.content,
            metadata: raw.metadata,
            kind,
        })
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        let mut raw = RawMessage {
            kind: message.role().to_string(),
            content: message.content,
            id: message.id,
            metadata: message.metadata,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            status: None,
        };
        match message.kind {
            MessageKind::Human => {}
            MessageKind::Assistant { tool_calls } => raw.tool_calls = tool_calls,
            MessageKind::Tool {
                tool_call_id,
                name,
                status,
            } => {
                raw.tool_call_id = Some(tool_call_id);
                raw.name = name;
                raw.status = Some(status);
            }
        }
        raw
    }
}
