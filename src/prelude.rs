//! Convenience re-exports for common use.

pub use crate::config::{DatabaseConfig, ModelConfig, RuntimeConfig, TelemetryConfig};
pub use crate::engine::{DialogueEngine, EngineFactory, EngineSpec, ReactEngineFactory};
pub use crate::error::{Result, ThreadlineError};
pub use crate::filter::{filter_current_interaction, filter_value};
pub use crate::hooks::HookPipeline;
pub use crate::model::{ChatModel, ModelRequest, ModelResponse};
pub use crate::persistence::{CheckpointBackend, Checkpointer, InMemoryBackend, PostgresBackend};
pub use crate::session::SessionRuntime;
pub use crate::setup::Mode;
pub use crate::tools::{FnTool, Tool, ToolContext, ToolParameters};
pub use crate::types::{
    ConversationState, Message, QueryInput, Role, RunConfig, StreamChunk, ToolCall,
};
