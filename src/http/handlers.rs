//! Fault-injection handlers.
//!
//! Each handler runs inside the server span opened by the instrumentation
//! layer and opens at most one child scope around its workload.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opentelemetry::trace::{TraceContextExt, Tracer};
use opentelemetry::KeyValue;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::http::server::AppState;
use crate::observability::metrics;
use crate::workload::memory::allocate_block;
use crate::workload::RetentionUsage;

pub const HELLO_BODY: &str = "Hello World";
pub const SLOW_BODY: &str = "Slow endpoint finished";
pub const ALLOC_BODY: &str = "Alloc endpoint finished";

/// Baseline path: short random delay, occasional injected 500.
pub async fn hello(State(state): State<AppState>) -> Response {
    let config = &state.workloads.config;
    let (delay_ms, fail) = {
        let mut rng = rand::thread_rng();
        let delay_ms = if config.hello_max_delay_ms > 0 {
            rng.gen_range(0..config.hello_max_delay_ms)
        } else {
            0
        };
        (delay_ms, rng.gen::<f64>() < config.hello_failure_rate)
    };

    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    if fail {
        tracing::debug!("Injected failure on /hello");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    HELLO_BODY.into_response()
}

#[derive(Debug, Deserialize)]
pub struct SlowParams {
    pub loops: Option<u32>,
}

/// CPU hot path: repeated regex check inside `slow_business_logic`.
pub async fn slow(State(state): State<AppState>, Query(params): Query<SlowParams>) -> &'static str {
    let loops = params
        .loops
        .unwrap_or(state.workloads.config.slow_iterations)
        .max(1);

    state
        .telemetry
        .tracer()
        .in_span("slow_business_logic", |cx| {
            cx.span().set_attribute(KeyValue::new("loops", i64::from(loops)));
            state.workloads.email.check_repeated(loops)
        });
    SLOW_BODY
}

#[derive(Debug, Deserialize)]
pub struct AllocParams {
    #[serde(default)]
    pub clear: bool,
    pub hold: Option<bool>,
}

/// Memory path: allocate and touch a block, then retain it in the FIFO buffer.
pub async fn alloc(State(state): State<AppState>, Query(params): Query<AllocParams>) -> &'static str {
    let workloads = &state.workloads;
    let hold = params.hold.unwrap_or(true);

    let retained = state
        .telemetry
        .tracer()
        .in_span("alloc_business_logic", |cx| {
            let span = cx.span();
            if params.clear {
                let dropped = workloads.retention.clear();
                span.set_attribute(KeyValue::new("cleared_blocks", dropped as i64));
            }

            let block = allocate_block(
                workloads.config.alloc_chunk_size,
                workloads.config.alloc_chunk_count,
            );
            span.set_attribute(KeyValue::new("block_bytes", block.len() as i64));

            if !hold {
                return None;
            }
            let retained = workloads.retention.retain(block);
            span.set_attribute(KeyValue::new("retained_blocks", retained.len as i64));
            if let Some(evicted) = retained.evicted {
                tracing::debug!(block = evicted.0, "Evicted oldest retained block");
            }
            Some(retained)
        });

    let usage = match retained {
        Some(retained) => RetentionUsage {
            blocks: retained.len,
            bytes: retained.bytes,
        },
        None => workloads.retention.usage(),
    };
    metrics::record_retention(usage.blocks, usage.bytes);
    ALLOC_BODY
}

#[derive(Debug, Deserialize)]
pub struct CpuParams {
    pub ms: Option<u64>,
}

/// Duration-bound CPU burn inside `cpu_business_logic`.
pub async fn cpu(State(state): State<AppState>, Query(params): Query<CpuParams>) -> Json<serde_json::Value> {
    let config = &state.workloads.config;
    let ms = params.ms.unwrap_or(config.cpu_default_ms).min(config.cpu_max_ms);

    let report = state
        .telemetry
        .tracer()
        .in_span("cpu_business_logic", |cx| {
            let report = state.workloads.email.burn_for(Duration::from_millis(ms));
            cx.span().set_attributes([
                KeyValue::new("ms", ms as i64),
                KeyValue::new("iterations", report.iterations as i64),
            ]);
            report
        });

    Json(json!({
        "ok": true,
        "ms": ms,
        "cost_ms": report.elapsed.as_millis() as u64,
        "iterations": report.iterations,
        "acc": report.acc,
    }))
}
