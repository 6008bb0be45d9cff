//! Persistence contract: checkpoints of conversation state keyed by thread.
//!
//! The session runtime only acquires a [`Checkpointer`] from a
//! [`CheckpointBackend`] and hands it to the dialogue engine; storage format
//! and durability belong to the backend.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryBackend, InMemoryCheckpointer};
pub use postgres::{PostgresBackend, PostgresCheckpointer};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::setup::Mode;
use crate::types::ConversationState;

/// Persisted conversation state for one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: ConversationState,
    pub updated_at: DateTime<Utc>,
}

/// Checkpoint store used by the dialogue engine.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Latest checkpoint for `thread_id`.
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Replace the checkpoint for `thread_id` with `state`.
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()>;

    /// Remove the checkpoint for `thread_id`. Returns whether one existed.
    async fn delete(&self, thread_id: &str) -> Result<bool>;
}

/// Constructs persistence handles from connection parameters.
///
/// Called once per setup track; `mode` tells the backend which track the
/// handle serves so pools are never shared across runtimes.
#[async_trait]
pub trait CheckpointBackend: Send + Sync {
    async fn connect(&self, config: &DatabaseConfig, mode: Mode) -> Result<Arc<dyn Checkpointer>>;
}
