//! Query facade: the four public entry points.
//!
//! Every entry point runs the same pipeline: ensure the mode's setup track,
//! hand the payload and configuration to the engine unchanged, trim the result
//! to the current interaction, and record the outcome on a span.
//!
//! The synchronous surface drives the async pipeline on a current-thread
//! runtime built on first use. Synchronous methods must not be called from
//! inside an async context, and a runtime that has served synchronous calls
//! must be dropped outside of one.

use std::sync::{Arc, OnceLock};

use bon::bon;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::runtime::Runtime;
use tracing::Instrument;

use crate::config::RuntimeConfig;
use crate::engine::EngineFactory;
use crate::error::{Result, SetupStage, ThreadlineError};
use crate::filter::{filter_chunk, filter_current_interaction};
use crate::hooks::HookPipeline;
use crate::persistence::{CheckpointBackend, PostgresBackend};
use crate::setup::{Mode, SetupManager};
use crate::telemetry;
use crate::tools::Tool;
use crate::types::{ConversationState, QueryInput, RunConfig, StreamChunk};

/// Stateful conversational session runtime.
///
/// Cheap to clone; clones share setup state and the blocking runtime.
#[derive(Clone)]
pub struct SessionRuntime {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    setup: SetupManager,
    blocking: OnceLock<Runtime>,
}

impl SessionInner {
    fn blocking_runtime(&self) -> Result<&Runtime> {
        if let Some(runtime) = self.blocking.get() {
            return Ok(runtime);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("threadline-sync")
            .build()
            .map_err(|e| {
                ThreadlineError::setup(SetupStage::Runtime, "could not build the blocking runtime", e)
            })?;
        // A concurrent caller may have won the race; its runtime is kept.
        let _ = self.blocking.set(runtime);
        self.blocking.get().ok_or_else(|| {
            ThreadlineError::setup_msg(SetupStage::Runtime, "blocking runtime unavailable")
        })
    }
}

impl std::fmt::Debug for SessionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRuntime")
            .field("setup", &self.inner.setup)
            .finish_non_exhaustive()
    }
}

#[bon]
impl SessionRuntime {
    /// Build a runtime. Nothing connects until the first query.
    ///
    /// Tracing export is initialized here from `config.telemetry`; it is a
    /// no-op when no endpoint is configured or when already initialized.
    #[builder]
    pub fn new(
        config: RuntimeConfig,
        factory: Arc<dyn EngineFactory>,
        #[builder(default = Arc::new(PostgresBackend::new()) as Arc<dyn CheckpointBackend>)]
        backend: Arc<dyn CheckpointBackend>,
        #[builder(default)] tools: Vec<Arc<dyn Tool>>,
        #[builder(default)] hooks: HookPipeline,
    ) -> Self {
        telemetry::init_telemetry(&config.telemetry);
        Self {
            inner: Arc::new(SessionInner {
                setup: SetupManager::new(config, backend, factory, tools, hooks),
                blocking: OnceLock::new(),
            }),
        }
    }
}

impl SessionRuntime {
    /// Setup manager, for diagnostics.
    pub fn setup(&self) -> &SetupManager {
        &self.inner.setup
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.inner.setup.config()
    }

    /// Blocking one-shot query. Returns the current interaction.
    pub fn query(&self, input: QueryInput, config: &RunConfig) -> Result<ConversationState> {
        let runtime = self.inner.blocking_runtime()?;
        runtime.block_on(run_query(&self.inner, Mode::Sync, "query", input, config))
    }

    /// Async one-shot query. Returns the current interaction.
    pub async fn async_query(&self, input: QueryInput, config: &RunConfig) -> Result<ConversationState> {
        run_query(&self.inner, Mode::Async, "async_query", input, config).await
    }

    /// Blocking, lazy stream of filtered increments.
    ///
    /// Setup and the engine run as the iterator is advanced.
    pub fn stream_query(&self, input: QueryInput, config: &RunConfig) -> BlockingStream {
        BlockingStream {
            session: self.inner.clone(),
            stream: Some(filtered_stream(
                self.inner.clone(),
                Mode::Sync,
                "stream_query",
                input,
                config.clone(),
            )),
        }
    }

    /// Async, lazy stream of filtered increments.
    pub fn async_stream_query(
        &self,
        input: QueryInput,
        config: &RunConfig,
    ) -> BoxStream<'static, Result<StreamChunk>> {
        filtered_stream(
            self.inner.clone(),
            Mode::Async,
            "async_stream_query",
            input,
            config.clone(),
        )
    }

    /// Mark both setup tracks as needing construction.
    pub async fn reset(&self) {
        self.inner.setup.reset();
    }

    /// Same as [`reset`](Self::reset), callable without an executor.
    pub fn reset_blocking(&self) {
        self.inner.setup.reset();
    }

    /// Flag that setup is needed before the next query. Safe to call from
    /// any context; it never blocks.
    pub fn set_up(&self) {
        self.inner.setup.reset();
    }
}

async fn run_query(
    inner: &SessionInner,
    mode: Mode,
    operation: &'static str,
    input: QueryInput,
    config: &RunConfig,
) -> Result<ConversationState> {
    let span = telemetry::query_span(operation, mode, config, &inner.setup.config().model);
    telemetry::record_input(&span, input.messages.len());

    let result = async {
        let engine = inner.setup.ensure_ready(mode).await?;
        let history = engine.invoke(input, config).await?;
        let total = history.len();
        Ok::<_, ThreadlineError>((total, filter_current_interaction(history)))
    }
    .instrument(span.clone())
    .await;

    match result {
        Ok((total, current)) => {
            telemetry::record_success(&span, total, &current);
            Ok(current)
        }
        Err(err) => {
            telemetry::record_failure(&span, &err);
            Err(err)
        }
    }
}

fn filtered_stream(
    inner: Arc<SessionInner>,
    mode: Mode,
    operation: &'static str,
    input: QueryInput,
    config: RunConfig,
) -> BoxStream<'static, Result<StreamChunk>> {
    let span = telemetry::query_span(operation, mode, &config, &inner.setup.config().model);
    telemetry::record_input(&span, input.messages.len());

    async_stream::stream! {
        let engine = match inner.setup.ensure_ready(mode).instrument(span.clone()).await {
            Ok(engine) => engine,
            Err(err) => {
                telemetry::record_failure(&span, &err);
                yield Err(err);
                return;
            }
        };

        let mut upstream = engine.stream(input, config);
        let mut chunks = 0usize;
        let mut last: Option<ConversationState> = None;
        while let Some(item) = upstream.next().instrument(span.clone()).await {
            match item {
                Ok(chunk) => {
                    let chunk = filter_chunk(chunk);
                    chunks += 1;
                    if let Some(state) = chunk.state() {
                        last = Some(state.clone());
                    }
                    yield Ok(chunk);
                }
                Err(err) => {
                    telemetry::record_failure(&span, &err);
                    yield Err(err);
                    return;
                }
            }
        }
        telemetry::record_stream_end(&span, chunks, last.as_ref());
    }
    .boxed()
}

/// Iterator returned by [`SessionRuntime::stream_query`].
///
/// Single pass; each `next` blocks until the engine produces the next
/// increment. Dropping it abandons the turn.
pub struct BlockingStream {
    session: Arc<SessionInner>,
    stream: Option<BoxStream<'static, Result<StreamChunk>>>,
}

impl Iterator for BlockingStream {
    type Item = Result<StreamChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = self.stream.as_mut()?;
        let item = match self.session.blocking_runtime() {
            Ok(runtime) => runtime.block_on(stream.next()),
            Err(err) => Some(Err(err)),
        };
        if matches!(item, None | Some(Err(_))) {
            self.stream = None;
        }
        item
    }
}

impl std::fmt::Debug for BlockingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingStream")
            .field("finished", &self.stream.is_none())
            .finish()
    }
}
