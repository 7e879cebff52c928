//! Logging setup for SDK consumers
//!
//! The subscriber is one `EnvFilter` followed by a list of output layers:
//! stderr (JSON or text), an optional rotating log file and an optional
//! OTLP trace exporter. `RUST_LOG` replaces the configured level.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{Sampler, TracerProvider},
    Resource,
};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type OutputLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Flushes the log file and exported spans when dropped.
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
    exports_traces: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.exports_traces {
            shutdown_telemetry();
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// A failing OTLP exporter is logged and skipped; logging itself still
/// comes up.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<TelemetryGuard> {
    let mut layers: Vec<OutputLayer> = vec![output_layer(config.json, std::io::stderr, true)];

    let file_guard = if config.file_enabled {
        let (writer, guard) = file_writer(config)?;
        layers.push(output_layer(config.json, writer, false));
        Some(guard)
    } else {
        None
    };

    let (provider, otel_error) = if config.opentelemetry_enabled {
        match tracer_provider(config) {
            Ok(provider) => (Some(provider), None),
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };
    if let Some(provider) = &provider {
        layers.push(
            tracing_opentelemetry::layer()
                .with_tracer(provider.tracer("nabla-db-backup"))
                .with_tracked_inactivity(true)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(env_filter(&config.level))
        .with(layers)
        .try_init()?;

    let exports_traces = provider.is_some();
    if let Some(provider) = provider {
        global::set_tracer_provider(provider);
    }
    if let Some(err) = otel_error {
        tracing::warn!(error = %err, endpoint = %config.otlp_endpoint, "OTLP export disabled");
    }

    tracing::debug!(
        json = config.json,
        file = config.file_enabled,
        otlp = exports_traces,
        service_name = %config.service_name,
        "Logging initialized"
    );

    Ok(TelemetryGuard {
        _file_guard: file_guard,
        exports_traces,
    })
}

/// Flush and stop the OTLP exporter, if one was installed.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

fn output_layer<W>(json: bool, writer: W, ansi: bool) -> OutputLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);
    if json {
        layer
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        layer.boxed()
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

fn default_directives(level: &str) -> String {
    // sqlx logs every statement at debug
    format!(
        "nabla={level},nabla_cli={level},nabla_db_backup={level},nabla_query={level},sqlx=warn,reqwest=warn,hyper=warn"
    )
}

fn file_writer(
    config: &LoggingConfig,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    std::fs::create_dir_all(&config.file_directory)?;
    let rotation = match config.file_rotation.as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    };
    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.file_directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

fn tracer_provider(config: &LoggingConfig) -> anyhow::Result<TracerProvider> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint)
        .with_timeout(Duration::from_secs(config.otlp_timeout_seconds))
        .build_span_exporter()?;

    let trace_config = opentelemetry_sdk::trace::Config::default()
        .with_sampler(sampler_for_ratio(config.trace_sample_ratio))
        .with_resource(resource(config));

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_config(trace_config)
        .build())
}

fn resource(config: &LoggingConfig) -> Resource {
    let version = config
        .service_version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    Resource::new([
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", version),
        KeyValue::new(
            "deployment.environment",
            config.deployment_environment.clone(),
        ),
    ])
}

fn sampler_for_ratio(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio)))
    }
}
