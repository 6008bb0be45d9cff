//! Chat-model contract consumed by the reference dialogue engine.
//!
//! No provider wire format lives in this crate; callers plug their own
//! [`ChatModel`] implementation (HTTP client, local model, test double).

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;

use crate::error::Result;
use crate::tools::ToolDefinition;
use crate::types::{Message, MessageContent, ToolCall};

/// A request sent to a chat model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub temperature: f64,
    pub system_instructions: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// A single model reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelResponse {
    pub content: MessageContent,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelResponse {
    /// Plain text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: MessageContent::Text(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Reply that requests tool calls.
    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: MessageContent::default(),
            tool_calls,
        }
    }

    /// Convert into the assistant message appended to the conversation.
    pub fn into_message(self) -> Message {
        Message::assistant_with_tool_calls(self.content, self.tool_calls)
    }
}

/// Core trait implemented by chat model backends.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Backend name for logs (e.g. "vertex", "scripted").
    fn name(&self) -> &str;

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse>;
}
