// Telemetry module for structured logging, metrics, and tracing

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "gstin9r-reports-api";

/// Initialize logging to the console and, when `log_file` is set, to an append-only file
///
/// `RUST_LOG` takes precedence over `log_level`. With a `tracing_endpoint` spans are also
/// exported over OTLP.
pub fn init_logging(
    log_level: &str,
    log_file: Option<&str>,
    tracing_endpoint: Option<&str>,
) -> Result<()> {
    // Create environment filter from log level
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let console_layer = fmt::layer().with_target(false);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let telemetry_layer = match tracing_endpoint {
        Some(endpoint) => Some(tracing_opentelemetry::layer().with_tracer(init_tracer(endpoint)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .with(telemetry_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        log_level = log_level,
        log_file = log_file,
        tracing_endpoint = tracing_endpoint,
        "Logging initialized"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    Ok(tracer_provider.tracer(SERVICE_NAME))
}

/// Flush remaining spans on graceful shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus recorder and describe the database metrics
///
/// The returned handle renders the exposition text served at `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_metrics();

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "db_queries_total",
        "Database client calls by statement kind and outcome"
    );
    describe_counter!(
        "db_query_retries_total",
        "Reconnect-and-retry cycles after a connection-level query failure"
    );
    describe_counter!(
        "db_connect_failures_total",
        "Failed attempts to acquire a database connection"
    );
    describe_histogram!(
        "db_query_duration_seconds",
        "Wall time of database client calls including connect and retry"
    );
    describe_gauge!(
        "db_pool_connections_in_use",
        "Connections currently checked out of the pool"
    );
}
