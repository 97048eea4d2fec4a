//! Tracing subscriber and OpenTelemetry wiring.
//!
//! Logs are always written to stdout as JSON, filtered by `RUST_LOG` (default
//! `info`). When an OTLP endpoint is configured, spans are also exported over
//! gRPC; the returned [`TelemetryGuard`] flushes them on drop.

use std::backtrace::Backtrace;
use std::panic;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "hubhook";

/// Keeps the span exporter alive. Bind it for the whole of `main`.
#[must_use = "dropping the guard shuts down span export"]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(err) = provider.shutdown() {
                tracing::warn!(error = %err, "OpenTelemetry tracer provider shutdown error");
            }
        }
    }
}

/// Installs the global subscriber.
///
/// Must be called from within a Tokio runtime when `otlp_endpoint` is set.
///
/// # Errors
///
/// Fails if the OTLP exporter cannot be built or a global subscriber is
/// already installed.
pub fn init(otlp_endpoint: Option<&str>) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let provider = otlp_endpoint.map(build_provider).transpose()?;
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(TelemetryGuard { provider })
}

fn build_provider(endpoint: &str) -> Result<TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .with_context(|| format!("Failed to build OTLP span exporter for {endpoint}"))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]))
        .build())
}

/// Routes panics through `tracing` with a captured backtrace.
///
/// Handler panics are caught and reported by the dispatcher; this hook makes
/// sure the stack trace of every panic also reaches the log.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_owned());
        let backtrace = Backtrace::force_capture();

        tracing::error!(
            panic = %message,
            %location,
            backtrace = %backtrace,
            "Panic"
        );
    }));
}
