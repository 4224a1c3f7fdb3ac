//! Local metrics and Prometheus exposition.
//!
//! # Metrics
//! - `demo_http_requests_total` (counter): requests by route, status
//! - `demo_http_request_duration_seconds` (histogram): handler latency by route
//! - `demo_retention_blocks` (gauge): blocks held by the retention buffer
//! - `demo_retention_bytes` (gauge): bytes held by the retention buffer
//! - `demo_generator_iterations_total` (counter): generator loop iterations by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no recorder installed
//!   the calls are no-ops
//! - The scrape endpoint is optional and independent of OTLP export

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Count a served request and record its latency.
pub fn record_request(route: &'static str, status: u16, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    counter!(
        "demo_http_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("demo_http_request_duration_seconds", "route" => route).record(duration);
}

/// Publish the retention buffer's current size.
pub fn record_retention(blocks: usize, bytes: usize) {
    gauge!("demo_retention_blocks").set(blocks as f64);
    gauge!("demo_retention_bytes").set(bytes as f64);
}

pub fn record_generator_iteration(outcome: &'static str) {
    counter!("demo_generator_iterations_total", "outcome" => outcome).increment(1);
}
