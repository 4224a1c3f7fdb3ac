//! Shared utilities for integration tests.
//!
//! Telemetry is wired to in-memory exporters so tests can assert on the
//! exact spans, log records and metric points the application produced.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::logs::AnyValue;
use opentelemetry_sdk::logs::{InMemoryLogExporter, SdkLoggerProvider};
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, Metric, MetricData};
use opentelemetry_sdk::metrics::{InMemoryMetricExporter, SdkMeterProvider};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use demo_app::config::{TelemetryConfig, WorkloadConfig};
use demo_app::http::{AppState, HttpServer};
use demo_app::lifecycle::Shutdown;
use demo_app::observability::{ResourceIdentity, Telemetry};
use demo_app::profiling::ProfileLabels;
use demo_app::workload::Workloads;

/// Telemetry context backed by in-memory exporters.
pub struct TestTelemetry {
    pub telemetry: Arc<Telemetry>,
    pub spans: InMemorySpanExporter,
    pub logs: InMemoryLogExporter,
    pub metrics: InMemoryMetricExporter,
    meter_provider: SdkMeterProvider,
}

impl TestTelemetry {
    pub fn new() -> Self {
        let spans = InMemorySpanExporter::default();
        let logs = InMemoryLogExporter::default();
        let metrics = InMemoryMetricExporter::default();
        let meter_provider = SdkMeterProvider::builder()
            .with_periodic_exporter(metrics.clone())
            .build();
        let telemetry = Telemetry::from_providers(
            ResourceIdentity::from_config(&TelemetryConfig::default()).unwrap(),
            SdkTracerProvider::builder()
                .with_simple_exporter(spans.clone())
                .build(),
            meter_provider.clone(),
            SdkLoggerProvider::builder()
                .with_simple_exporter(logs.clone())
                .build(),
            ProfileLabels::disabled(),
        );

        Self {
            telemetry: Arc::new(telemetry),
            spans,
            logs,
            metrics,
            meter_provider,
        }
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().unwrap()
    }

    pub fn spans_named(&self, name: &str) -> Vec<SpanData> {
        self.finished_spans()
            .into_iter()
            .filter(|span| span.name == name)
            .collect()
    }

    /// Log bodies rendered as plain strings, in emission order.
    pub fn log_bodies(&self) -> Vec<String> {
        self.logs
            .get_emitted_logs()
            .unwrap()
            .iter()
            .filter_map(|log| match log.record.body() {
                Some(AnyValue::String(body)) => Some(body.as_str().to_string()),
                _ => None,
            })
            .collect()
    }
}

impl TestTelemetry {
    /// Flush the meter provider and return the latest cumulative `name` stream.
    fn with_metric<T>(&self, name: &str, read: impl FnOnce(Option<&Metric>) -> T) -> T {
        self.meter_provider.force_flush().unwrap();
        let exported = self.metrics.get_finished_metrics().unwrap();
        let metric = exported.last().and_then(|resource| {
            resource
                .scope_metrics()
                .flat_map(|scope| scope.metrics())
                .find(|metric| metric.name() == name)
        });
        read(metric)
    }

    /// Points of a `u64` counter as (sorted `key=value` attributes, value).
    pub fn counter_points(&self, name: &str) -> Vec<(Vec<String>, u64)> {
        self.with_metric(name, |metric| match metric.map(Metric::data) {
            Some(AggregatedMetrics::U64(MetricData::Sum(sum))) => sum
                .data_points()
                .map(|point| {
                    let mut attributes: Vec<String> = point
                        .attributes()
                        .map(|kv| format!("{}={}", kv.key.as_str(), kv.value))
                        .collect();
                    attributes.sort();
                    (attributes, point.value())
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Sum of a counter across every attribute set.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counter_points(name).iter().map(|(_, value)| value).sum()
    }

    /// Number of recordings in an `f64` histogram across every attribute set.
    pub fn histogram_count(&self, name: &str) -> u64 {
        self.with_metric(name, |metric| match metric.map(Metric::data) {
            Some(AggregatedMetrics::F64(MetricData::Histogram(histogram))) => {
                histogram.data_points().map(|point| point.count()).sum()
            }
            _ => 0,
        })
    }
}

/// Workload settings small enough for tests.
pub fn small_workloads() -> WorkloadConfig {
    WorkloadConfig {
        hello_max_delay_ms: 0,
        hello_failure_rate: 0.0,
        slow_iterations: 10,
        cpu_default_ms: 20,
        alloc_chunk_size: 1024,
        alloc_chunk_count: 4,
        ..WorkloadConfig::default()
    }
}

pub fn app_state(telemetry: &TestTelemetry, workload: WorkloadConfig) -> AppState {
    AppState {
        telemetry: Arc::clone(&telemetry.telemetry),
        workloads: Arc::new(Workloads::new(workload).unwrap()),
    }
}

/// A server bound to an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub async fn start(state: AppState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(HttpServer::new(state).run(listener, shutdown.subscribe()));
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
