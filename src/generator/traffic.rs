//! Self-driving traffic loop.
//!
//! # Responsibilities
//! - Open a fresh root span per iteration and burn CPU inside it
//! - Call the downstream `/slow` route with the trace context propagated
//! - Emit the request log and metrics once the span has closed
//! - Sleep a random interval, stopping promptly on shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use opentelemetry::trace::{SpanContext, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use rand::Rng;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::GeneratorConfig;
use crate::http::inject_context;
use crate::observability::{metrics, Telemetry};
use crate::workload::EmailCheck;

/// Name of the root span opened by every iteration.
pub const ROOT_SPAN: &str = "traffic_generator_request";

/// Route exercised downstream.
pub const TARGET_ROUTE: &str = "/slow";

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Counters describing what the loop has done so far.
#[derive(Debug, Default)]
pub struct GeneratorStats {
    iterations: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl GeneratorStats {
    /// Iterations started.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Downstream calls that returned a response.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Downstream calls that failed or timed out.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Outcome of one iteration, captured before the root span closes.
struct Iteration {
    result: Result<u16, DownstreamError>,
    elapsed: Duration,
    span_context: SpanContext,
}

pub struct TrafficGenerator {
    config: GeneratorConfig,
    client: reqwest::Client,
    target: String,
    telemetry: Arc<Telemetry>,
    email: EmailCheck,
    stats: Arc<GeneratorStats>,
}

impl TrafficGenerator {
    /// Build a generator calling `target_base_url` plus the `/slow` route.
    pub fn new(
        config: GeneratorConfig,
        target_base_url: &str,
        telemetry: Arc<Telemetry>,
        email: EmailCheck,
    ) -> Result<Self, DownstreamError> {
        let client = reqwest::Client::builder().build()?;
        let target = format!("{}{}", target_base_url.trim_end_matches('/'), TARGET_ROUTE);

        Ok(Self {
            config,
            client,
            target,
            telemetry,
            email,
            stats: Arc::new(GeneratorStats::default()),
        })
    }

    /// Shared counters, readable while the loop runs.
    pub fn stats(&self) -> Arc<GeneratorStats> {
        Arc::clone(&self.stats)
    }

    /// Run the loop on its own task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Loop until the shutdown broadcast fires. Failed iterations never stop it.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            target_url = %self.target,
            min_sleep_ms = self.config.min_sleep_ms,
            max_sleep_ms = self.config.max_sleep_ms,
            "Traffic generator starting"
        );

        loop {
            tokio::select! {
                _ = self.iterate() => {}
                _ = shutdown.recv() => break,
            }

            let pause = self.next_pause();
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!(
            iterations = self.stats.iterations(),
            failures = self.stats.failures(),
            "Traffic generator stopped"
        );
    }

    async fn iterate(&self) {
        let iteration = self
            .telemetry
            .tracer()
            .in_span_async(ROOT_SPAN, &Context::new(), |cx| self.traced_call(cx))
            .await;

        self.stats.iterations.fetch_add(1, Ordering::Relaxed);
        let signals = self.telemetry.signals();
        match &iteration.result {
            Ok(status) => {
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                metrics::record_generator_iteration("ok");
                signals.record_success(
                    TARGET_ROUTE,
                    *status,
                    iteration.elapsed,
                    &iteration.span_context,
                );
            }
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_generator_iteration("error");
                tracing::warn!(error = %err, target_url = %self.target, "Downstream call failed");
                signals.record_failure(TARGET_ROUTE, err, &iteration.span_context);
            }
        }
    }

    async fn traced_call(&self, cx: Context) -> Iteration {
        let identity = self.telemetry.identity();
        cx.span().set_attributes([
            KeyValue::new("job", identity.job().to_string()),
            KeyValue::new("service_name", identity.service_name().to_string()),
        ]);

        self.email.check_repeated(self.config.local_iterations);

        let start = Instant::now();
        let result = self.call_downstream(&cx).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(status) => {
                cx.span()
                    .set_attribute(KeyValue::new("http.response.status_code", i64::from(*status)));
            }
            Err(err) => {
                cx.span().record_error(err);
                cx.span().set_status(Status::error(err.to_string()));
            }
        }

        Iteration {
            result,
            elapsed,
            span_context: cx.span().span_context().clone(),
        }
    }

    async fn call_downstream(&self, cx: &Context) -> Result<u16, DownstreamError> {
        let mut headers = HeaderMap::new();
        inject_context(cx, &mut headers);

        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let request = self.client.get(&self.target).headers(headers).send();
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => Ok(response.status().as_u16()),
            Ok(Err(err)) => Err(DownstreamError::Transport(err)),
            Err(_) => Err(DownstreamError::Timeout(timeout)),
        }
    }

    fn next_pause(&self) -> Duration {
        let (min, max) = (self.config.min_sleep_ms, self.config.max_sleep_ms);
        let ms = if max > min {
            rand::thread_rng().gen_range(min..max)
        } else {
            min
        };
        Duration::from_millis(ms)
    }
}
