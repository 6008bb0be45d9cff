//! threadline: a stateful session runtime for tool-using conversational engines.
//!
//! A [`SessionRuntime`](session::SessionRuntime) lazily builds one dialogue
//! engine per invocation style (sync/async), runs every query through it with
//! a hook pipeline wrapped around each model step, trims the persisted history
//! to the current interaction, and records the outcome as a tracing span.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use threadline::prelude::*;
//!
//! # async fn example(model: Arc<dyn ChatModel>) -> threadline::error::Result<()> {
//! // `model` is any `ChatModel` implementation: an HTTP client, a local model.
//! let config = RuntimeConfig::from_env()?;
//! let runtime = SessionRuntime::builder()
//!     .config(config)
//!     .factory(Arc::new(ReactEngineFactory::new(model)))
//!     .build();
//!
//! let reply = runtime
//!     .async_query(QueryInput::human("oi"), &RunConfig::for_thread("thread-1"))
//!     .await?;
//! println!("{}", reply.messages.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod model;
pub mod persistence;
pub mod prelude;
pub mod session;
pub mod setup;
pub mod telemetry;
pub mod tools;
pub mod types;
