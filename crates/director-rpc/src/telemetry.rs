use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const OTEL_SERVICE_NAME: &str = "director-rpc";

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// JSON logs to stderr, filtered by `RUST_LOG` (default `info`).
///
/// Spans get W3C trace ids so that trace context travels in message headers;
/// nothing is exported.
pub fn init_logger() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .json();

    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
    let tracer_provider = SdkTracerProvider::builder().build();
    let otel_trace_layer =
        tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer(OTEL_SERVICE_NAME));
    opentelemetry::global::set_tracer_provider(tracer_provider.clone());
    let already_set = TRACER_PROVIDER.set(tracer_provider).is_err();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(otel_trace_layer)
        .init();

    if already_set {
        tracing::warn!("Tracer provider already initialized; keeping existing provider");
    }
}

pub fn shutdown() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        eprintln!("Failed to shutdown tracer provider: {e}");
    }
}
