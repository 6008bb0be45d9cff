//! Current-interaction view of a conversation.
//!
//! The engine always returns the full persisted history; callers only get the
//! slice starting at the most recent human message.

use serde_json::Value;

use crate::types::{ConversationState, Role, StreamChunk};

/// Trim `state` to the messages from the latest human message onward.
///
/// A state without any human message is returned unchanged.
pub fn filter_current_interaction(mut state: ConversationState) -> ConversationState {
    if let Some(start) = state.last_human_index() {
        state.messages.drain(..start);
    }
    state
}

/// Apply [`filter_current_interaction`] to the state carried by a chunk.
pub fn filter_chunk(chunk: StreamChunk) -> StreamChunk {
    match chunk {
        StreamChunk::Values { state } => StreamChunk::Values {
            state: filter_current_interaction(state),
        },
        StreamChunk::Update { step, state } => StreamChunk::Update {
            step,
            state: filter_current_interaction(state),
        },
        custom @ StreamChunk::Custom { .. } => custom,
    }
}

/// Same rule on a serialized state.
///
/// Values without a `messages` array, or with an empty one, pass through.
/// A message counts as human when its `type` (or `role`) is `human` or `user`.
pub fn filter_value(mut value: Value) -> Value {
    let Some(messages) = value.get_mut("messages").and_then(Value::as_array_mut) else {
        return value;
    };
    if let Some(start) = messages.iter().rposition(is_human_value) {
        messages.drain(..start);
    }
    value
}

fn is_human_value(message: &Value) -> bool {
    ["type", "role"]
        .iter()
        .filter_map(|key| message.get(key).and_then(Value::as_str))
        .any(|tag| matches!(tag.parse::<Role>(), Ok(Role::Human)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn texts(state: &ConversationState) -> Vec<String> {
        state.messages.iter().map(Message::text).collect()
    }

    #[test]
    fn keeps_from_latest_human_message() {
        let state = ConversationState::new(vec![
            Message::human("h1"),
            Message::assistant("a1"),
            Message::human("h2"),
            Message::assistant("a2"),
        ]);
        let filtered = filter_current_interaction(state);
        assert_eq!(texts(&filtered), vec!["h2", "a2"]);
    }

    #[test]
    fn no_human_message_is_unchanged() {
        let state = ConversationState::new(vec![Message::assistant("a1"), Message::assistant("a2")]);
        let filtered = filter_current_interaction(state.clone());
        assert_eq!(filtered, state);
    }

    #[test]
    fn empty_state_is_unchanged() {
        let filtered = filter_current_interaction(ConversationState::default());
        assert!(filtered.is_empty());
    }

    #[test]
    fn trailing_human_message_stands_alone() {
        let state = ConversationState::new(vec![Message::assistant("a0"), Message::human("h1")]);
        assert_eq!(texts(&filter_current_interaction(state)), vec!["h1"]);
    }

    #[test]
    fn chunk_filter_preserves_step_and_custom() {
        let chunk = StreamChunk::Update {
            step: "model".into(),
            state: ConversationState::new(vec![Message::human("h1"), Message::human("h2")]),
        };
        match filter_chunk(chunk) {
            StreamChunk::Update { step, state } => {
                assert_eq!(step, "model");
                assert_eq!(texts(&state), vec!["h2"]);
            }
            other => panic!("unexpected chunk: {other:?}"),
        }

        let custom = StreamChunk::Custom { data: json!({"n": 1}) };
        assert_eq!(filter_chunk(custom.clone()), custom);
    }

    #[test]
    fn value_filter_matches_typed_filter() {
        let value = json!({
            "messages": [
                {"type": "human", "content": "oi"},
                {"type": "ai", "content": "Olá!"},
                {"role": "user", "content": "tudo bem?"},
                {"type": "ai", "content": "Tudo ótimo!"}
            ],
            "remaining_steps": 3
        });
        let filtered = filter_value(value.clone());
        assert_eq!(
            filtered,
            json!({
                "messages": [
                    {"role": "user", "content": "tudo bem?"},
                    {"type": "ai", "content": "Tudo ótimo!"}
                ],
                "remaining_steps": 3
            })
        );

        let typed: ConversationState = serde_json::from_value(value).unwrap();
        let typed = serde_json::to_value(filter_current_interaction(typed)).unwrap();
        assert_eq!(typed["messages"][0]["content"], "tudo bem?");
        assert_eq!(typed["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn value_without_messages_passes_through() {
        for value in [json!({"other": 1}), json!({"messages": []}), json!("text"), json!(null)] {
            assert_eq!(filter_value(value.clone()), value);
        }
    }
}
