//! Tool system for function calling.

pub mod schema;
pub mod tool;

pub use schema::{ParameterBuilder, ToolParameters};
pub use tool::{FnTool, Tool, ToolContext, ToolDefinition};
