//! Per-mode lazy construction of the dialogue engine.
//!
//! Each mode owns one slot guarded by an async mutex that is held across
//! construction. Concurrent callers of [`SetupManager::ensure_ready`] for the
//! same mode queue on that mutex; the first one builds, the rest observe
//! `Ready` and reuse the engine.
//!
//! Resetting never takes that mutex. It raises a per-slot `stale` flag that
//! the next [`SetupManager::ensure_ready`] consumes under the lock, so a reset
//! is safe from synchronous and asynchronous callers alike.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use strum::{Display, EnumIter, EnumString};
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::RuntimeConfig;
use crate::engine::{DialogueEngine, EngineFactory, EngineSpec};
use crate::error::{Result, SetupStage, ThreadlineError};
use crate::hooks::HookPipeline;
use crate::persistence::CheckpointBackend;
use crate::tools::Tool;

/// Invocation style a setup track serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    Sync,
    Async,
}

/// Setup record of one mode.
#[derive(Clone, Default)]
pub enum SetupState {
    #[default]
    Uninitialized,
    Ready(Arc<dyn DialogueEngine>),
}

impl SetupState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SetupState::Ready(_))
    }
}

impl std::fmt::Debug for SetupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupState::Uninitialized => f.write_str("Uninitialized"),
            SetupState::Ready(_) => f.write_str("Ready"),
        }
    }
}

#[derive(Default)]
struct Slot {
    state: Mutex<SetupState>,
    stale: AtomicBool,
    constructions: AtomicUsize,
}

/// Builds and caches one dialogue engine per [`Mode`].
pub struct SetupManager {
    config: RuntimeConfig,
    backend: Arc<dyn CheckpointBackend>,
    factory: Arc<dyn EngineFactory>,
    tools: Vec<Arc<dyn Tool>>,
    hooks: HookPipeline,
    slots: HashMap<Mode, Slot>,
}

impl std::fmt::Debug for SetupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupManager")
            .field("model", &self.config.model.model)
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

impl SetupManager {
    pub fn new(
        config: RuntimeConfig,
        backend: Arc<dyn CheckpointBackend>,
        factory: Arc<dyn EngineFactory>,
        tools: Vec<Arc<dyn Tool>>,
        hooks: HookPipeline,
    ) -> Self {
        use strum::IntoEnumIterator;
        let slots = Mode::iter().map(|mode| (mode, Slot::default())).collect();
        Self {
            config,
            backend,
            factory,
            tools,
            hooks,
            slots,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn slot(&self, mode: Mode) -> Result<&Slot> {
        self.slots
            .get(&mode)
            .ok_or(ThreadlineError::EngineNotReady(mode))
    }

    /// Return the engine for `mode`, constructing it on first use.
    ///
    /// On failure the record stays `Uninitialized` and the next call retries.
    pub async fn ensure_ready(&self, mode: Mode) -> Result<Arc<dyn DialogueEngine>> {
        let slot = self.slot(mode)?;
        let mut state = slot.state.lock().await;
        if slot.stale.swap(false, Ordering::SeqCst) {
            *state = SetupState::Uninitialized;
        }
        if let SetupState::Ready(engine) = &*state {
            return Ok(engine.clone());
        }

        let span = tracing::info_span!(
            "threadline.setup",
            mode = %mode,
            model = %self.config.model.model,
            temperature = self.config.model.temperature,
            success = tracing::field::Empty,
        );
        let result = self.construct(mode).instrument(span.clone()).await;
        span.record("success", result.is_ok());

        match result {
            Ok(engine) => {
                slot.constructions.fetch_add(1, Ordering::SeqCst);
                *state = SetupState::Ready(engine.clone());
                tracing::info!(%mode, "dialogue engine ready");
                Ok(engine)
            }
            Err(err) => {
                tracing::error!(%mode, error = %err, "setup failed");
                Err(err)
            }
        }
    }

    async fn construct(&self, mode: Mode) -> Result<Arc<dyn DialogueEngine>> {
        self.config.database.validate()?;
        let checkpointer = self
            .backend
            .connect(&self.config.database, mode)
            .await
            .map_err(|err| match err {
                setup @ ThreadlineError::Setup { .. } => setup,
                other => ThreadlineError::setup(
                    SetupStage::Persistence,
                    "could not acquire a persistence handle",
                    other,
                ),
            })?;

        let spec = EngineSpec {
            model: self.config.model.clone(),
            tools: self.tools.clone(),
            checkpointer,
            hooks: self.hooks.clone(),
        };
        self.factory.build(spec).await.map_err(|err| match err {
            setup @ ThreadlineError::Setup { .. } => setup,
            other => ThreadlineError::setup(
                SetupStage::Engine,
                "could not construct the dialogue engine",
                other,
            ),
        })
    }

    /// Mark both modes uninitialized; the next query rebuilds from current
    /// configuration.
    ///
    /// Does not wait: a construction already in progress completes, and its
    /// engine is discarded by the next [`ensure_ready`](Self::ensure_ready).
    pub fn reset(&self) {
        let _span = tracing::info_span!("threadline.reset", modes = self.slots.len()).entered();
        for (mode, slot) in &self.slots {
            slot.stale.store(true, Ordering::SeqCst);
            tracing::debug!(%mode, "setup record reset");
        }
    }

    /// Current record of `mode`. Waits for a construction in progress.
    pub async fn state(&self, mode: Mode) -> SetupState {
        let Ok(slot) = self.slot(mode) else {
            return SetupState::Uninitialized;
        };
        let state = slot.state.lock().await;
        if slot.stale.load(Ordering::SeqCst) {
            SetupState::Uninitialized
        } else {
            state.clone()
        }
    }

    /// Engines constructed for `mode` so far.
    pub fn constructions(&self, mode: Mode) -> usize {
        self.slot(mode)
            .map(|slot| slot.constructions.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}
