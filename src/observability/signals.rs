//! Per-request log records and metric samples.
//!
//! A completed unit of work produces one log record and, on success, one
//! counter increment plus one duration observation. Log bodies embed every
//! correlation field as plain text so full-text search in the log store can
//! find them without parsing attributes.

use std::fmt;
use std::time::{Duration, SystemTime};

use opentelemetry::logs::{AnyValue, LogRecord, Logger, Severity};
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use opentelemetry::{Key, KeyValue, StringValue};
use opentelemetry_sdk::logs::SdkLogger;

pub const REQUEST_COUNT_METRIC: &str = "demo_request_total";
pub const REQUEST_DURATION_METRIC: &str = "demo_request_duration_seconds";

const METHOD: &str = "GET";

/// Log record describing one completed call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestLog {
    Ok {
        route: String,
        status: u16,
        duration_ms: u64,
        trace_id: TraceId,
        span_id: SpanId,
    },
    Error {
        route: String,
        error: String,
        trace_id: TraceId,
        span_id: SpanId,
    },
}

impl RequestLog {
    pub fn ok(route: &str, status: u16, duration: Duration, span_context: &SpanContext) -> Self {
        Self::Ok {
            route: route.to_string(),
            status,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
        }
    }

    pub fn error(route: &str, error: &dyn fmt::Display, span_context: &SpanContext) -> Self {
        Self::Error {
            route: route.to_string(),
            error: error.to_string(),
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
        }
    }

    /// Text body in the format the log store searches on.
    pub fn body(&self) -> String {
        self.to_string()
    }

    pub fn severity(&self) -> Severity {
        match self {
            RequestLog::Ok { .. } => Severity::Info,
            RequestLog::Error { .. } => Severity::Error,
        }
    }

    fn severity_text(&self) -> &'static str {
        match self {
            RequestLog::Ok { .. } => "INFO",
            RequestLog::Error { .. } => "ERROR",
        }
    }

    fn ids(&self) -> (TraceId, SpanId) {
        match self {
            RequestLog::Ok { trace_id, span_id, .. } | RequestLog::Error { trace_id, span_id, .. } => {
                (*trace_id, *span_id)
            }
        }
    }

    /// Structured attributes mirroring the body fields.
    pub fn attributes(&self) -> Vec<(Key, AnyValue)> {
        let (trace_id, span_id) = self.ids();
        let mut attributes = match self {
            RequestLog::Ok {
                route,
                status,
                duration_ms,
                ..
            } => vec![
                (Key::from_static_str("route"), string(route.clone())),
                (Key::from_static_str("method"), string(METHOD.to_string())),
                (Key::from_static_str("status"), AnyValue::Int(i64::from(*status))),
                (
                    Key::from_static_str("duration_ms"),
                    AnyValue::Int(i64::try_from(*duration_ms).unwrap_or(i64::MAX)),
                ),
            ],
            RequestLog::Error { route, error, .. } => vec![
                (Key::from_static_str("route"), string(route.clone())),
                (Key::from_static_str("method"), string(METHOD.to_string())),
                (Key::from_static_str("error"), string(error.clone())),
            ],
        };
        attributes.push((Key::from_static_str("trace_id"), string(trace_id.to_string())));
        attributes.push((Key::from_static_str("span_id"), string(span_id.to_string())));
        attributes
    }
}

fn string(value: String) -> AnyValue {
    AnyValue::String(StringValue::from(value))
}

impl fmt::Display for RequestLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestLog::Ok {
                route,
                status,
                duration_ms,
                trace_id,
                span_id,
            } => write!(
                f,
                "[OK] route={route} method={METHOD} status={status} duration_ms={duration_ms} trace_id={trace_id} span_id={span_id}"
            ),
            RequestLog::Error {
                route,
                error,
                trace_id,
                span_id,
            } => write!(
                f,
                "[ERROR] route={route} method={METHOD} err={error} trace_id={trace_id} span_id={span_id}"
            ),
        }
    }
}

/// Log and metric emitters for completed calls.
#[derive(Clone)]
pub struct RequestSignals {
    logger: SdkLogger,
    request_count: Counter<u64>,
    request_duration: Histogram<f64>,
}

impl RequestSignals {
    pub fn new(meter: &Meter, logger: SdkLogger) -> Self {
        Self {
            logger,
            request_count: meter
                .u64_counter(REQUEST_COUNT_METRIC)
                .with_description("Total requests")
                .build(),
            request_duration: meter
                .f64_histogram(REQUEST_DURATION_METRIC)
                .with_description("Request duration in seconds")
                .with_unit("s")
                .build(),
        }
    }

    /// Count the call, observe its duration and emit an INFO record.
    pub fn record_success(
        &self,
        route: &str,
        status: u16,
        duration: Duration,
        span_context: &SpanContext,
    ) {
        self.request_count.add(
            1,
            &[
                KeyValue::new("method", METHOD),
                KeyValue::new("status", status.to_string()),
                KeyValue::new("route", route.to_string()),
            ],
        );
        self.request_duration.record(
            duration.as_secs_f64(),
            &[KeyValue::new("route", route.to_string())],
        );
        self.emit(
            &RequestLog::ok(route, status, duration, span_context),
            span_context.trace_flags(),
        );
    }

    /// Emit an ERROR record; failed calls are not counted.
    pub fn record_failure(&self, route: &str, error: &dyn fmt::Display, span_context: &SpanContext) {
        self.emit(
            &RequestLog::error(route, error, span_context),
            span_context.trace_flags(),
        );
    }

    fn emit(&self, log: &RequestLog, trace_flags: TraceFlags) {
        let (trace_id, span_id) = log.ids();
        let mut record = self.logger.create_log_record();
        record.set_timestamp(SystemTime::now());
        record.set_severity_number(log.severity());
        record.set_severity_text(log.severity_text());
        record.set_body(string(log.body()));
        record.add_attributes(log.attributes());
        record.set_trace_context(trace_id, span_id, Some(trace_flags));
        self.logger.emit(record);
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::TraceState;

    use super::*;

    fn span_context() -> SpanContext {
        SpanContext::new(
            TraceId::from_bytes(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736u128.to_be_bytes()),
            SpanId::from_bytes(0x00f0_67aa_0ba9_02b7u64.to_be_bytes()),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        )
    }

    #[test]
    fn ok_body_embeds_search_fields() {
        let log = RequestLog::ok("/slow", 200, Duration::from_millis(1234), &span_context());
        assert_eq!(
            log.body(),
            "[OK] route=/slow method=GET status=200 duration_ms=1234 \
             trace_id=4bf92f3577b34da6a3ce929d0e0e4736 span_id=00f067aa0ba902b7"
        );
        assert_eq!(log.severity(), Severity::Info);
    }

    #[test]
    fn error_body_embeds_error_text() {
        let log = RequestLog::error("/slow", &"connection refused", &span_context());
        assert_eq!(
            log.body(),
            "[ERROR] route=/slow method=GET err=connection refused \
             trace_id=4bf92f3577b34da6a3ce929d0e0e4736 span_id=00f067aa0ba902b7"
        );
        assert_eq!(log.severity(), Severity::Error);
    }

    #[test]
    fn attributes_mirror_body() {
        let log = RequestLog::ok("/slow", 200, Duration::from_millis(5), &span_context());
        let attributes = log.attributes();
        let get = |key: &str| {
            attributes
                .iter()
                .find(|(k, _)| k.as_str() == key)
                .map(|(_, v)| v.clone())
        };

        assert_eq!(get("route"), Some(string("/slow".to_string())));
        assert_eq!(get("status"), Some(AnyValue::Int(200)));
        assert_eq!(get("duration_ms"), Some(AnyValue::Int(5)));
        assert_eq!(
            get("trace_id"),
            Some(string("4bf92f3577b34da6a3ce929d0e0e4736".to_string()))
        );
    }
}
