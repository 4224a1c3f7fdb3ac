//! Traffic generator tests against a live server and an unreachable one.

use std::sync::Arc;
use std::time::Duration;

use demo_app::config::GeneratorConfig;
use demo_app::generator::{TrafficGenerator, ROOT_SPAN};
use demo_app::lifecycle::Shutdown;
use demo_app::observability::{REQUEST_COUNT_METRIC, REQUEST_DURATION_METRIC};
use demo_app::workload::EmailCheck;

mod common;

use common::{app_state, small_workloads, wait_until, RunningServer, TestTelemetry};

fn fast_config() -> GeneratorConfig {
    GeneratorConfig {
        enabled: true,
        target_base_url: None,
        local_iterations: 5,
        min_sleep_ms: 1,
        max_sleep_ms: 5,
        request_timeout_secs: 2,
    }
}

#[tokio::test]
async fn success_logs_route_status_and_trace_id() {
    let telemetry = TestTelemetry::new();
    let server = RunningServer::start(app_state(&telemetry, small_workloads())).await;

    let generator = TrafficGenerator::new(
        fast_config(),
        &server.base_url(),
        Arc::clone(&telemetry.telemetry),
        EmailCheck::new().unwrap(),
    )
    .unwrap();
    let stats = generator.stats();
    let shutdown = Shutdown::new();
    let handle = generator.spawn(shutdown.subscribe());

    assert!(wait_until(Duration::from_secs(10), || stats.successes() >= 2).await);
    shutdown.trigger();
    handle.await.unwrap();
    server.stop().await;

    let roots = telemetry.spans_named(ROOT_SPAN);
    assert!(roots.len() >= 2);
    let root = &roots[0];
    let trace_id = root.span_context.trace_id().to_string();

    let bodies = telemetry.log_bodies();
    let log = bodies
        .iter()
        .find(|body| body.contains(&trace_id))
        .expect("no log for the first iteration");
    assert!(log.starts_with("[OK] "));
    assert!(log.contains("route=/slow"));
    assert!(log.contains("status=200"));
    assert!(log.contains(&format!("span_id={}", root.span_context.span_id())));

    // The downstream server span joined the generator's trace.
    let downstream = telemetry
        .spans_named("Slow")
        .into_iter()
        .find(|span| span.span_context.trace_id() == root.span_context.trace_id())
        .expect("downstream span missing");
    assert_ne!(downstream.parent_span_id, opentelemetry::trace::SpanId::INVALID);

    let successes = stats.successes();
    assert_eq!(
        telemetry.counter_points(REQUEST_COUNT_METRIC),
        vec![(
            vec![
                "method=GET".to_string(),
                "route=/slow".to_string(),
                "status=200".to_string(),
            ],
            successes,
        )]
    );
    assert_eq!(telemetry.histogram_count(REQUEST_DURATION_METRIC), successes);
}

#[tokio::test]
async fn unreachable_target_keeps_looping() {
    let telemetry = TestTelemetry::new();

    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let generator = TrafficGenerator::new(
        fast_config(),
        &format!("http://{addr}"),
        Arc::clone(&telemetry.telemetry),
        EmailCheck::new().unwrap(),
    )
    .unwrap();
    let stats = generator.stats();
    let shutdown = Shutdown::new();
    let handle = generator.spawn(shutdown.subscribe());

    assert!(wait_until(Duration::from_secs(10), || stats.failures() >= 3).await);
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("generator ignored shutdown")
        .unwrap();

    assert_eq!(stats.successes(), 0);
    let bodies = telemetry.log_bodies();
    assert!(bodies.len() >= 3);
    assert!(bodies
        .iter()
        .all(|body| body.starts_with("[ERROR] route=/slow method=GET err=")));

    let roots = telemetry.spans_named(ROOT_SPAN);
    assert!(roots
        .iter()
        .all(|span| matches!(span.status, opentelemetry::trace::Status::Error { .. })));

    assert_eq!(telemetry.counter_total(REQUEST_COUNT_METRIC), 0);
    assert_eq!(telemetry.histogram_count(REQUEST_DURATION_METRIC), 0);
}

#[tokio::test]
async fn shutdown_interrupts_a_long_pause() {
    let telemetry = TestTelemetry::new();
    let server = RunningServer::start(app_state(&telemetry, small_workloads())).await;

    let generator = TrafficGenerator::new(
        GeneratorConfig {
            min_sleep_ms: 60_000,
            max_sleep_ms: 60_001,
            ..fast_config()
        },
        &server.base_url(),
        Arc::clone(&telemetry.telemetry),
        EmailCheck::new().unwrap(),
    )
    .unwrap();
    let stats = generator.stats();
    let shutdown = Shutdown::new();
    let handle = generator.spawn(shutdown.subscribe());

    assert!(wait_until(Duration::from_secs(10), || stats.iterations() >= 1).await);
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("pause was not interrupted")
        .unwrap();
    assert_eq!(stats.iterations(), 1);

    server.stop().await;
}
