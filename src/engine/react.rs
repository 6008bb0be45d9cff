//! Reference engine: a model/tool loop over a [`ChatModel`].
//!
//! Each turn loads the thread's checkpoint, appends the input, and alternates
//! model and tool steps until the model answers without tool calls. The hook
//! pipeline wraps every model step. The state is checkpointed once the input
//! is appended and again after each step, so an abandoned stream still leaves
//! the completed steps persisted.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;

use super::{DialogueEngine, EngineFactory, EngineSpec};
use crate::error::{Result, ThreadlineError};
use crate::model::{ChatModel, ModelRequest};
use crate::tools::{ToolContext, ToolDefinition};
use crate::types::{
    ConversationState, Message, QueryInput, RunConfig, StreamChunk, ToolCall, ToolStatus,
};

/// Step budget for one turn when the call does not set `recursion_limit`.
pub const MAX_ITERATIONS: usize = 20;

const MODEL_STEP: &str = "model";
const TOOLS_STEP: &str = "tools";

/// Model/tool loop engine.
#[derive(Clone)]
pub struct ReactEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    model: Arc<dyn ChatModel>,
    spec: EngineSpec,
    definitions: Vec<ToolDefinition>,
}

impl ReactEngine {
    pub fn new(model: Arc<dyn ChatModel>, spec: EngineSpec) -> Self {
        let definitions = spec.tools.iter().map(|tool| tool.definition()).collect();
        Self {
            inner: Arc::new(EngineInner {
                model,
                spec,
                definitions,
            }),
        }
    }
}

impl std::fmt::Debug for ReactEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactEngine")
            .field("model", &self.inner.model.name())
            .field("spec", &self.inner.spec)
            .finish()
    }
}

#[async_trait]
impl DialogueEngine for ReactEngine {
    async fn invoke(&self, input: QueryInput, config: &RunConfig) -> Result<ConversationState> {
        let mut turn = Turn::start(self.inner.clone(), input, config.clone()).await?;
        while turn.step().await?.is_some() {}
        Ok(turn.state)
    }

    fn stream(&self, input: QueryInput, config: RunConfig) -> BoxStream<'static, Result<StreamChunk>> {
        let inner = self.inner.clone();
        async_stream::stream! {
            let mut turn = match Turn::start(inner, input, config).await {
                Ok(turn) => turn,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            loop {
                match turn.step().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Model,
    Tools,
    Finish,
    Done,
}

/// One in-flight turn on one thread.
struct Turn {
    inner: Arc<EngineInner>,
    config: RunConfig,
    thread_id: String,
    state: ConversationState,
    phase: Phase,
    iteration: usize,
    limit: usize,
}

impl Turn {
    async fn start(inner: Arc<EngineInner>, input: QueryInput, config: RunConfig) -> Result<Self> {
        let thread_id = config
            .thread_id()
            .map(str::to_string)
            .ok_or_else(|| {
                ThreadlineError::Engine(
                    "configurable.thread_id is required when a checkpointer is bound".into(),
                )
            })?;

        let mut state = inner
            .spec
            .checkpointer
            .load(&thread_id)
            .await?
            .map(|checkpoint| checkpoint.state)
            .unwrap_or_default();
        let resumed = state.len();
        state.messages.extend(input.messages);
        tracing::debug!(thread_id = %thread_id, resumed, total = state.len(), "turn started");

        let limit = config.recursion_limit.unwrap_or(MAX_ITERATIONS);
        let turn = Self {
            inner,
            config,
            thread_id,
            state,
            phase: Phase::Model,
            iteration: 0,
            limit,
        };
        // The input is durable before the model runs.
        turn.persist().await?;
        Ok(turn)
    }

    async fn step(&mut self) -> Result<Option<StreamChunk>> {
        match self.phase {
            Phase::Model => self.model_step().await.map(Some),
            Phase::Tools => self.tools_step().await.map(Some),
            Phase::Finish => {
                self.phase = Phase::Done;
                Ok(Some(StreamChunk::Values {
                    state: self.state.clone(),
                }))
            }
            Phase::Done => Ok(None),
        }
    }

    async fn model_step(&mut self) -> Result<StreamChunk> {
        if self.iteration >= self.limit {
            self.phase = Phase::Done;
            return Err(ThreadlineError::Engine(format!(
                "turn exceeded {} model steps without a final answer",
                self.limit
            )));
        }
        self.iteration += 1;

        let hooks = &self.inner.spec.hooks;
        hooks.pre_model(&mut self.state, &self.config)?;

        let settings = &self.inner.spec.model;
        let request = ModelRequest {
            model: settings.model.clone(),
            temperature: settings.temperature,
            system_instructions: settings.system_instructions.clone(),
            messages: self.state.messages.clone(),
            tools: self.inner.definitions.clone(),
        };
        let response = self.inner.model.generate(&request).await?;
        let wants_tools = !response.tool_calls.is_empty();
        self.state.messages.push(response.into_message());

        hooks.post_model(&mut self.state, &self.config)?;
        self.persist().await?;

        tracing::debug!(
            thread_id = %self.thread_id,
            iteration = self.iteration,
            wants_tools,
            "model step complete"
        );
        self.phase = if wants_tools { Phase::Tools } else { Phase::Finish };
        Ok(StreamChunk::Update {
            step: MODEL_STEP.to_string(),
            state: self.state.clone(),
        })
    }

    async fn tools_step(&mut self) -> Result<StreamChunk> {
        // Calls are read back after the post-model hook rewrote their arguments.
        let calls: Vec<ToolCall> = self
            .state
            .messages
            .last()
            .map(|message| message.tool_calls().to_vec())
            .unwrap_or_default();

        for call in &calls {
            let result = self.execute(call).await;
            self.state.messages.push(result);
        }

        self.inner.spec.hooks.post_model(&mut self.state, &self.config)?;
        self.persist().await?;

        self.phase = Phase::Model;
        Ok(StreamChunk::Update {
            step: TOOLS_STEP.to_string(),
            state: self.state.clone(),
        })
    }

    async fn execute(&self, call: &ToolCall) -> Message {
        let Some(tool) = self.inner.spec.tools.iter().find(|tool| tool.name() == call.name) else {
            tracing::warn!(tool = %call.name, "model called an unknown tool");
            return Message::tool_result(
                call,
                json!({ "error": format!("Tool '{}' not found", call.name) }),
                ToolStatus::Error,
            );
        };

        let ctx = ToolContext {
            thread_id: Some(self.thread_id.clone()),
            tool_call_id: Some(call.id.clone()),
        };
        match tool.execute(&call.args, &ctx).await {
            Ok(value) => Message::tool_result(call, value, ToolStatus::Success),
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "tool execution failed");
                Message::tool_result(call, json!({ "error": err.to_string() }), ToolStatus::Error)
            }
        }
    }

    async fn persist(&self) -> Result<()> {
        self.inner
            .spec
            .checkpointer
            .save(&self.thread_id, &self.state)
            .await
    }
}

/// Builds [`ReactEngine`]s around a shared chat model.
#[derive(Clone)]
pub struct ReactEngineFactory {
    model: Arc<dyn ChatModel>,
}

impl ReactEngineFactory {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

impl std::fmt::Debug for ReactEngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactEngineFactory")
            .field("model", &self.model.name())
            .finish()
    }
}

#[async_trait]
impl EngineFactory for ReactEngineFactory {
    async fn build(&self, spec: EngineSpec) -> Result<Arc<dyn DialogueEngine>> {
        if !spec.model.temperature.is_finite() {
            return Err(ThreadlineError::Engine(format!(
                "invalid temperature {}",
                spec.model.temperature
            )));
        }
        tracing::info!(
            backend = self.model.name(),
            model = %spec.model.model,
            tools = spec.tools.len(),
            "react engine constructed"
        );
        Ok(Arc::new(ReactEngine::new(self.model.clone(), spec)))
    }
}
