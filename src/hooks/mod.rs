//! Hook pipeline run around every model step.
//!
//! The pre-model hook stamps arriving messages and re-asserts the caller's
//! identity on pending tool calls; the post-model hook stamps what the model
//! and tools produced and re-asserts identity again, so a `user_id` hallucinated
//! by the model never reaches a tool.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::types::{ConversationState, MessageKind, RunConfig, USER_ID_ARG};

/// Source of the current instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What a hook pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookReport {
    /// Messages that received a timestamp.
    pub stamped: usize,
    /// `user_id` arguments overwritten with the thread identifier.
    pub rewritten: usize,
}

/// Pre-model and post-model state transformations.
#[derive(Clone)]
pub struct HookPipeline {
    clock: Clock,
}

impl Default for HookPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPipeline").finish_non_exhaustive()
    }
}

impl HookPipeline {
    /// Pipeline using the system clock.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(Utc::now),
        }
    }

    /// Pipeline using a custom clock.
    pub fn with_clock<F>(clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            clock: Arc::new(clock),
        }
    }

    /// Run before the model sees the state.
    ///
    /// Stamps every message that has no timestamp yet, then injects identity.
    pub fn pre_model(&self, state: &mut ConversationState, config: &RunConfig) -> Result<HookReport> {
        let now = (self.clock)();
        let mut report = HookReport::default();
        for message in &mut state.messages {
            if message.stamp_if_absent(now)? {
                report.stamped += 1;
            }
        }
        report.rewritten = inject_identity(state, config);
        tracing::debug!(
            stamped = report.stamped,
            rewritten = report.rewritten,
            messages = state.len(),
            "pre-model hook"
        );
        Ok(report)
    }

    /// Run after the model (or the tools) produced new messages.
    ///
    /// Stamps tool results and assistant messages, then injects identity.
    pub fn post_model(&self, state: &mut ConversationState, config: &RunConfig) -> Result<HookReport> {
        let now = (self.clock)();
        let mut report = HookReport::default();
        for message in &mut state.messages {
            let completed = match message.kind {
                MessageKind::Assistant { .. } | MessageKind::Tool { .. } => true,
                MessageKind::Human => false,
            };
            if completed && message.stamp_if_absent(now)? {
                report.stamped += 1;
            }
        }
        report.rewritten = inject_identity(state, config);
        tracing::debug!(
            stamped = report.stamped,
            rewritten = report.rewritten,
            messages = state.len(),
            "post-model hook"
        );
        Ok(report)
    }
}

/// Overwrite `user_id` on the tool calls of the latest assistant message that
/// carries any. Earlier messages are left as they are.
fn inject_identity(state: &mut ConversationState, config: &RunConfig) -> usize {
    let Some(thread_id) = config.thread_id() else {
        return 0;
    };

    let Some(tool_calls) = state
        .messages
        .iter_mut()
        .rev()
        .filter_map(|message| message.tool_calls_mut())
        .find(|calls| !calls.is_empty())
    else {
        return 0;
    };

    let mut rewritten = 0;
    for call in tool_calls.iter_mut() {
        if let Some(arg) = call.args.get_mut(USER_ID_ARG) {
            *arg = Value::String(thread_id.to_string());
            rewritten += 1;
        }
    }
    rewritten
}
