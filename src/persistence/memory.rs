//! In-memory checkpoint store.
//!
//! Both setup tracks share one store, so a thread written through the
//! synchronous surface is visible to the asynchronous one (as with a real
//! database).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Checkpoint, CheckpointBackend, Checkpointer};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::setup::Mode;
use crate::types::ConversationState;

/// Checkpoints held in a process-local map.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    threads: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread ids with a stored checkpoint.
    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        self.threads.write().await.insert(
            thread_id.to_string(),
            Checkpoint {
                thread_id: thread_id.to_string(),
                state: state.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool> {
        Ok(self.threads.write().await.remove(thread_id).is_some())
    }
}

/// Backend handing out one shared [`InMemoryCheckpointer`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<InMemoryCheckpointer>,
    connects: Arc<AtomicUsize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared store, for inspection.
    pub fn store(&self) -> Arc<InMemoryCheckpointer> {
        self.store.clone()
    }

    /// Number of handles acquired so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointBackend for InMemoryBackend {
    async fn connect(&self, _config: &DatabaseConfig, mode: Mode) -> Result<Arc<dyn Checkpointer>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%mode, "in-memory checkpointer acquired");
        Ok(self.store.clone())
    }
}
