//! Error types for threadline.

use thiserror::Error;

use crate::setup::Mode;

/// Primary error type for all threadline operations.
#[derive(Error, Debug)]
pub enum ThreadlineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Setup failed during {stage}: {message}")]
    Setup {
        stage: SetupStage,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Dialogue engine for {0} mode is not ready")]
    EngineNotReady(Mode),

    #[error("Hook inconsistency: {0}")]
    HookInconsistency(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Which part of setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SetupStage {
    /// Acquiring the persistence handle.
    Persistence,
    /// Constructing the dialogue engine.
    Engine,
    /// Building the runtime that drives the synchronous surface.
    Runtime,
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Setup,
    Invariant,
    Persistence,
    Serialization,
    Model,
    ToolExecution,
    Unknown,
}

impl ThreadlineError {
    /// Setup failure with an underlying cause.
    pub fn setup(
        stage: SetupStage,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Setup {
            stage,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Setup failure without an underlying cause.
    pub fn setup_msg(stage: SetupStage, message: impl Into<String>) -> Self {
        Self::Setup {
            stage,
            message: message.into(),
            source: None,
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Setup { .. } => ErrorCategory::Setup,
            Self::EngineNotReady(_) | Self::HookInconsistency(_) => ErrorCategory::Invariant,
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Model(_) => ErrorCategory::Model,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Engine(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether a later call may succeed without a code change.
    ///
    /// Setup failures leave the setup record uninitialized, so the next query
    /// tries again; invariant violations never heal on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Setup | ErrorCategory::Persistence | ErrorCategory::Model
        )
    }

    /// Whether the error is one the facade surfaces as fatal to the caller
    /// (setup, configuration, and state invariants).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Setup { .. }
                | Self::EngineNotReady(_)
                | Self::HookInconsistency(_)
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ThreadlineError>;
