//! Dialogue engine contract.
//!
//! An engine owns the authoritative conversation state of each thread: it
//! loads it from the checkpointer, runs the model/tool loop with the hook
//! pipeline wrapped around every model step, persists the result, and returns
//! the full history. The session runtime only trims and traces what comes back.

pub mod react;

pub use react::{ReactEngine, ReactEngineFactory};

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::hooks::HookPipeline;
use crate::persistence::Checkpointer;
use crate::tools::Tool;
use crate::types::{ConversationState, QueryInput, RunConfig, StreamChunk};

/// A constructed dialogue engine, shared by every query of one mode.
#[async_trait]
pub trait DialogueEngine: Send + Sync {
    /// Run one turn to completion and return the full conversation state.
    async fn invoke(&self, input: QueryInput, config: &RunConfig) -> Result<ConversationState>;

    /// Run one turn, yielding an increment after each step.
    ///
    /// The stream is lazy: nothing runs until it is polled.
    fn stream(&self, input: QueryInput, config: RunConfig) -> BoxStream<'static, Result<StreamChunk>>;
}

/// Everything an engine is bound to at construction.
#[derive(Clone)]
pub struct EngineSpec {
    pub model: ModelConfig,
    pub tools: Vec<Arc<dyn Tool>>,
    pub checkpointer: Arc<dyn Checkpointer>,
    pub hooks: HookPipeline,
}

impl std::fmt::Debug for EngineSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSpec")
            .field("model", &self.model)
            .field(
                "tools",
                &self.tools.iter().map(|tool| tool.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Builds dialogue engines for the setup manager.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn build(&self, spec: EngineSpec) -> Result<Arc<dyn DialogueEngine>>;
}
