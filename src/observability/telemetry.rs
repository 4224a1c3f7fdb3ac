//! OpenTelemetry providers owned by the application.
//!
//! [`Telemetry`] is built once at startup and shared by the HTTP server and the
//! traffic generator. Nothing is installed as a global provider; callers reach
//! the tracer and the request signals through this context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use thiserror::Error;
use url::Url;

use crate::config::{Signal, TelemetryConfig};
use crate::observability::resource::ResourceIdentity;
use crate::observability::signals::RequestSignals;
use crate::profiling::{ProfileLabels, ProfiledTracer};

const INSTRUMENTATION_SCOPE: &str = "demo-app";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{signal} endpoint `{endpoint}` is not a valid http(s) URL")]
    Endpoint { signal: Signal, endpoint: String },

    #[error("failed to build {signal} exporter: {reason}")]
    Exporter { signal: Signal, reason: String },

    #[error("telemetry shutdown failed: {0}")]
    Shutdown(String),

    #[error("telemetry shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Trace, metric and log providers plus the handles built from them.
pub struct Telemetry {
    identity: ResourceIdentity,
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
    tracer: ProfiledTracer<SdkTracer>,
    signals: RequestSignals,
    shut_down: AtomicBool,
}

impl Telemetry {
    /// Build OTLP/HTTP exporters for every signal.
    ///
    /// An exporter that cannot be built is logged and its provider runs
    /// without one, dropping that signal. Call from a blocking context: the
    /// HTTP transport owns its own runtime.
    pub fn init(
        config: &TelemetryConfig,
        identity: &ResourceIdentity,
        labels: ProfileLabels,
    ) -> Self {
        let resource = identity.to_resource();
        let timeout = Duration::from_secs(config.export_timeout_secs);

        let mut tracer_builder = SdkTracerProvider::builder().with_resource(resource.clone());
        match span_exporter(config, timeout) {
            Ok(exporter) => tracer_builder = tracer_builder.with_batch_exporter(exporter),
            Err(err) => tracing::error!(error = %err, "Trace export disabled"),
        }

        let mut meter_builder = SdkMeterProvider::builder().with_resource(resource.clone());
        match metric_exporter(config, timeout) {
            Ok(exporter) => meter_builder = meter_builder.with_periodic_exporter(exporter),
            Err(err) => tracing::error!(error = %err, "Metric export disabled"),
        }

        let mut logger_builder = SdkLoggerProvider::builder().with_resource(resource);
        match log_exporter(config, timeout) {
            Ok(exporter) => logger_builder = logger_builder.with_batch_exporter(exporter),
            Err(err) => tracing::error!(error = %err, "Log export disabled"),
        }

        tracing::info!(
            endpoint = %config.otlp_endpoint,
            service_name = identity.service_name(),
            "Telemetry initialized"
        );

        Self::from_providers(
            identity.clone(),
            tracer_builder.build(),
            meter_builder.build(),
            logger_builder.build(),
            labels,
        )
    }

    /// Assemble the context from already configured providers.
    pub fn from_providers(
        identity: ResourceIdentity,
        tracer_provider: SdkTracerProvider,
        meter_provider: SdkMeterProvider,
        logger_provider: SdkLoggerProvider,
        labels: ProfileLabels,
    ) -> Self {
        let tracer = ProfiledTracer::new(tracer_provider.tracer(INSTRUMENTATION_SCOPE), labels);
        let meter = meter_provider.meter(INSTRUMENTATION_SCOPE);
        let signals = RequestSignals::new(&meter, logger_provider.logger(INSTRUMENTATION_SCOPE));

        Self {
            identity,
            tracer_provider,
            meter_provider,
            logger_provider,
            tracer,
            signals,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Resource identity every signal is exported with.
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Tracer whose spans carry the profile correlation id.
    pub fn tracer(&self) -> &ProfiledTracer<SdkTracer> {
        &self.tracer
    }

    /// Request log and metric instruments.
    pub fn signals(&self) -> &RequestSignals {
        &self.signals
    }

    /// Flush and shut down every provider, waiting at most `timeout`.
    ///
    /// Only the first call does any work.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), TelemetryError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let tracer_provider = self.tracer_provider.clone();
        let logger_provider = self.logger_provider.clone();
        let meter_provider = self.meter_provider.clone();
        let flush = tokio::task::spawn_blocking(move || {
            let mut failures = Vec::new();
            if let Err(err) = tracer_provider.shutdown() {
                failures.push(format!("traces: {err}"));
            }
            if let Err(err) = logger_provider.shutdown() {
                failures.push(format!("logs: {err}"));
            }
            if let Err(err) = meter_provider.shutdown() {
                failures.push(format!("metrics: {err}"));
            }
            failures
        });

        match tokio::time::timeout(timeout, flush).await {
            Ok(Ok(failures)) if failures.is_empty() => {
                tracing::info!("Telemetry flushed");
                Ok(())
            }
            Ok(Ok(failures)) => Err(TelemetryError::Shutdown(failures.join("; "))),
            Ok(Err(join)) => Err(TelemetryError::Shutdown(join.to_string())),
            Err(_) => Err(TelemetryError::ShutdownTimeout(timeout)),
        }
    }

    /// True once [`Telemetry::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

fn checked_endpoint(config: &TelemetryConfig, signal: Signal) -> Result<String, TelemetryError> {
    let endpoint = config.signal_endpoint(signal);
    let well_formed = Url::parse(&endpoint)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false);
    if well_formed {
        Ok(endpoint)
    } else {
        Err(TelemetryError::Endpoint { signal, endpoint })
    }
}

fn exporter_error(signal: Signal, err: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Exporter {
        signal,
        reason: err.to_string(),
    }
}

fn span_exporter(config: &TelemetryConfig, timeout: Duration) -> Result<SpanExporter, TelemetryError> {
    let endpoint = checked_endpoint(config, Signal::Traces)?;
    SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_timeout(timeout)
        .build()
        .map_err(|err| exporter_error(Signal::Traces, err))
}

fn metric_exporter(
    config: &TelemetryConfig,
    timeout: Duration,
) -> Result<MetricExporter, TelemetryError> {
    let endpoint = checked_endpoint(config, Signal::Metrics)?;
    MetricExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_timeout(timeout)
        .build()
        .map_err(|err| exporter_error(Signal::Metrics, err))
}

fn log_exporter(config: &TelemetryConfig, timeout: Duration) -> Result<LogExporter, TelemetryError> {
    let endpoint = checked_endpoint(config, Signal::Logs)?;
    LogExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_timeout(timeout)
        .build()
        .map_err(|err| exporter_error(Signal::Logs, err))
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{TraceContextExt, Tracer};
    use opentelemetry_sdk::logs::InMemoryLogExporter;
    use opentelemetry_sdk::trace::InMemorySpanExporter;

    use super::*;

    fn identity() -> ResourceIdentity {
        ResourceIdentity::from_config(&TelemetryConfig::default()).unwrap()
    }

    #[test]
    fn malformed_endpoint_is_reported_per_signal() {
        let config = TelemetryConfig {
            otlp_endpoint: "collector:4318".to_string(),
            ..TelemetryConfig::default()
        };
        match checked_endpoint(&config, Signal::Logs) {
            Err(TelemetryError::Endpoint { signal, endpoint }) => {
                assert_eq!(signal, Signal::Logs);
                assert_eq!(endpoint, "collector:4318/v1/logs");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn default_endpoints_are_accepted() {
        let config = TelemetryConfig::default();
        assert_eq!(
            checked_endpoint(&config, Signal::Traces).unwrap(),
            "http://localhost:4318/v1/traces"
        );
    }

    #[test]
    fn init_with_malformed_endpoint_still_traces() {
        let config = TelemetryConfig {
            otlp_endpoint: "not a url".to_string(),
            ..TelemetryConfig::default()
        };
        let telemetry = Telemetry::init(&config, &identity(), ProfileLabels::disabled());
        let valid = telemetry
            .tracer()
            .in_span("work", |cx| cx.span().span_context().is_valid());
        assert!(valid);
    }

    #[tokio::test]
    async fn shutdown_runs_once() {
        let spans = InMemorySpanExporter::default();
        let logs = InMemoryLogExporter::default();
        let telemetry = Telemetry::from_providers(
            identity(),
            SdkTracerProvider::builder()
                .with_simple_exporter(spans.clone())
                .build(),
            SdkMeterProvider::builder().build(),
            SdkLoggerProvider::builder()
                .with_simple_exporter(logs.clone())
                .build(),
            ProfileLabels::disabled(),
        );

        telemetry.tracer().in_span("before-shutdown", |_| {});
        assert!(telemetry.shutdown(Duration::from_secs(5)).await.is_ok());
        assert!(telemetry.is_shut_down());
        assert!(telemetry.shutdown(Duration::from_secs(5)).await.is_ok());
        assert_eq!(spans.get_finished_spans().unwrap().len(), 1);
    }
}
