//! Request-level instrumentation.
//!
//! Extracts the caller's trace context, runs the rest of the stack inside a
//! top-level server span and records the response status on it.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::KeyValue;

use crate::http::propagation::extract_context;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Route template and the name of its server span.
pub const ROUTES: [(&str, &str); 4] = [
    ("/hello", "Hello"),
    ("/slow", "Slow"),
    ("/alloc", "Alloc"),
    ("/cpu", "Cpu"),
];

/// Server span name for a matched route template.
pub fn server_span_name(route: &str) -> Option<(&'static str, &'static str)> {
    ROUTES.iter().copied().find(|(path, _)| *path == route)
}

pub async fn instrument(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let matched = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|path| server_span_name(path.as_str()));
    let Some((route, name)) = matched else {
        return next.run(request).await;
    };

    let parent_cx = extract_context(request.headers());
    let method = request.method().to_string();
    let start = Instant::now();

    state
        .telemetry
        .tracer()
        .in_span_async(name, &parent_cx, move |cx| async move {
            cx.span().set_attributes([
                KeyValue::new("http.request.method", method),
                KeyValue::new("http.route", route),
            ]);

            let response = next.run(request).await;

            let status = response.status();
            cx.span().set_attribute(KeyValue::new(
                "http.response.status_code",
                i64::from(status.as_u16()),
            ));
            if status.is_server_error() {
                cx.span().set_status(Status::error(status.to_string()));
            }
            metrics::record_request(route, status.as_u16(), start);
            response
        })
        .await
}
