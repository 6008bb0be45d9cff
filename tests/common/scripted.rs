//! Scripted chat model shared by the integration tests.
//!
//! Replies are consumed in order; when the script runs out the model answers
//! with a fixed fallback text. Every request is recorded for verification.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use threadline::error::{Result, ThreadlineError};
use threadline::model::{ChatModel, ModelRequest, ModelResponse};

#[derive(Debug, Clone)]
enum Scripted {
    Reply(ModelResponse),
    Fail(String),
}

/// A [`ChatModel`] that plays back queued replies.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_response(ModelResponse::text(text))
    }

    /// Queue an arbitrary reply.
    pub fn with_response(self, response: ModelResponse) -> Self {
        self.push(Scripted::Reply(response));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()));
        self
    }

    fn push(&self, item: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(item);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(ThreadlineError::Model(message)),
            None => Ok(ModelResponse::text("Scripted response")),
        }
    }
}
