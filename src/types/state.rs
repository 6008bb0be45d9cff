//! Conversation state, query payloads, and per-call configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::Message;

/// Ordered conversation history plus any extra keys an engine attaches.
///
/// Insertion order is chronological order; nothing in this crate reorders it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            extra: Map::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Index of the most recent human message.
    pub fn last_human_index(&self) -> Option<usize> {
        self.messages.iter().rposition(Message::is_human)
    }
}

/// Payload of a query: the new input for this turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryInput {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl QueryInput {
    /// Input carrying a single human message.
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::human(text.into())],
        }
    }
}

/// Keys under `configurable` in a [`RunConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configurable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-call configuration, passed verbatim to the dialogue engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub configurable: Configurable,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<usize>,
}

impl RunConfig {
    /// Configuration scoped to `thread_id`.
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            configurable: Configurable {
                thread_id: Some(thread_id.into()),
                extra: Map::new(),
            },
            ..Default::default()
        }
    }

    /// The thread identifier, if present and non-empty.
    pub fn thread_id(&self) -> Option<&str> {
        self.configurable
            .thread_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}

/// One increment yielded by a streaming query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Full conversation state after a step.
    Values { state: ConversationState },
    /// Messages produced by a single step (`model` or `tools`).
    Update {
        step: String,
        state: ConversationState,
    },
    /// Engine-specific event without a message collection.
    Custom { data: Value },
}

impl StreamChunk {
    /// The state carried by this chunk, if any.
    pub fn state(&self) -> Option<&ConversationState> {
        match self {
            StreamChunk::Values { state } | StreamChunk::Update { state, .. } => Some(state),
            StreamChunk::Custom { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_config_parses_configurable_thread() {
        let config: RunConfig = serde_json::from_value(json!({
            "configurable": {"thread_id": "thread-42", "checkpoint_ns": ""}
        }))
        .unwrap();
        assert_eq!(config.thread_id(), Some("thread-42"));
        assert!(config.configurable.extra.contains_key("checkpoint_ns"));
    }

    #[test]
    fn empty_thread_id_is_unresolved() {
        let config = RunConfig::for_thread("");
        assert_eq!(config.thread_id(), None);
        assert_eq!(RunConfig::default().thread_id(), None);
    }

    #[test]
    fn state_keeps_extra_keys() {
        let state: ConversationState = serde_json::from_value(json!({
            "messages": [{"role": "human", "content": "oi"}],
            "remaining_steps": 24
        }))
        .unwrap();
        assert_eq!(state.len(), 1);
        assert_eq!(state.extra["remaining_steps"], 24);

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["remaining_steps"], 24);
    }

    #[test]
    fn last_human_index_scans_from_end() {
        let state = ConversationState::new(vec![
            Message::human("a"),
            Message::assistant("b"),
            Message::human("c"),
            Message::assistant("d"),
        ]);
        assert_eq!(state.last_human_index(), Some(2));
        assert_eq!(ConversationState::default().last_human_index(), None);
    }

    #[test]
    fn stream_chunk_serializes_with_mode() {
        let chunk = StreamChunk::Update {
            step: "model".into(),
            state: ConversationState::new(vec![Message::assistant("hi")]),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["mode"], "update");
        assert_eq!(value["step"], "model");
        assert_eq!(value["state"]["messages"][0]["type"], "ai");
    }
}
