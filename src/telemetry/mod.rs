//! Tracing adapter: one-time OTLP exporter setup plus span helpers.
//!
//! Export is best effort. If the exporter or the subscriber cannot be
//! installed, a warning is logged and spans stay local (or go nowhere when no
//! subscriber exists). Nothing here returns an error to a query.

use std::collections::HashMap;
use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::field::Empty;
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{ModelConfig, TelemetryConfig};
use crate::error::{Result, ThreadlineError};
use crate::setup::Mode;
use crate::types::{ConversationState, RunConfig};

/// Outcome of [`init_telemetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryStatus {
    /// Spans are exported over OTLP.
    Exporting,
    /// No endpoint configured.
    Disabled,
    /// Setup failed; spans are not exported.
    Degraded,
}

static TELEMETRY: OnceLock<Installed> = OnceLock::new();

struct Installed {
    status: TelemetryStatus,
    provider: Option<SdkTracerProvider>,
}

/// Install the OTLP exporter and the global subscriber, once per process.
///
/// Later calls return the status of the first one regardless of `config`.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryStatus {
    TELEMETRY.get_or_init(|| install(config)).status
}

/// Status of the process-wide telemetry, if initialized.
pub fn telemetry_status() -> Option<TelemetryStatus> {
    TELEMETRY.get().map(|installed| installed.status)
}

/// Flush pending spans. Safe to call when telemetry is off.
pub fn flush_telemetry() {
    if let Some(provider) = TELEMETRY.get().and_then(|installed| installed.provider.as_ref()) {
        if let Err(err) = provider.force_flush() {
            tracing::warn!(error = %err, "failed to flush spans");
        }
    }
}

fn install(config: &TelemetryConfig) -> Installed {
    let Some(endpoint) = config.endpoint.as_deref() else {
        return Installed {
            status: TelemetryStatus::Disabled,
            provider: None,
        };
    };

    match try_install(endpoint, config) {
        Ok(provider) => Installed {
            status: TelemetryStatus::Exporting,
            provider: Some(provider),
        },
        Err(err) => {
            tracing::warn!(endpoint, error = %err, "tracing export disabled");
            Installed {
                status: TelemetryStatus::Degraded,
                provider: None,
            }
        }
    }
}

fn try_install(endpoint: &str, config: &TelemetryConfig) -> Result<SdkTracerProvider> {
    let headers: HashMap<String, String> = config.headers.iter().cloned().collect();
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.to_string())
        .with_headers(headers)
        .build()
        .map_err(|e| ThreadlineError::Configuration(format!("OTLP exporter: {e}")))?;

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .build();
    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()
        .map_err(|e| ThreadlineError::Configuration(format!("tracing subscriber: {e}")))?;

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}

/// Span for one facade operation (`query`, `stream_query`, ...).
///
/// `success`, message counts, and `snapshot` are filled in by the
/// `record_*` helpers.
pub fn query_span(operation: &'static str, mode: Mode, config: &RunConfig, model: &ModelConfig) -> Span {
    tracing::info_span!(
        "threadline.query",
        operation,
        mode = %mode,
        thread_id = config.thread_id().unwrap_or_default(),
        model = %model.model,
        temperature = model.temperature,
        input_messages = Empty,
        success = Empty,
        history_messages = Empty,
        returned_messages = Empty,
        chunks = Empty,
        snapshot = Empty,
        error = Empty,
    )
}

/// Record the size of the caller's payload.
pub fn record_input(span: &Span, input_messages: usize) {
    span.record("input_messages", input_messages);
}

/// Record a completed one-shot query.
///
/// `history_messages` counts the engine's full state, `current` is the
/// filtered view returned to the caller.
pub fn record_success(span: &Span, history_messages: usize, current: &ConversationState) {
    span.record("success", true);
    span.record("history_messages", history_messages);
    span.record("returned_messages", current.len());
    if let Some(snapshot) = snapshot(current) {
        span.record("snapshot", snapshot.as_str());
    }
}

/// Record the outcome of a stream once it finished.
pub fn record_stream_end(span: &Span, chunks: usize, last: Option<&ConversationState>) {
    span.record("success", true);
    span.record("chunks", chunks);
    if let Some(state) = last {
        span.record("returned_messages", state.len());
        if let Some(snapshot) = snapshot(state) {
            span.record("snapshot", snapshot.as_str());
        }
    }
}

pub fn record_failure(span: &Span, err: &ThreadlineError) {
    span.record("success", false);
    span.record("error", tracing::field::display(err));
}

fn snapshot(state: &ConversationState) -> Option<String> {
    match serde_json::to_string(&state.messages) {
        Ok(json) => Some(json),
        Err(err) => {
            tracing::debug!(error = %err, "skipping span snapshot");
            None
        }
    }
}
