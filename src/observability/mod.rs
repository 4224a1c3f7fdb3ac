//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     → resource.rs (service identity, built once)
//!     → telemetry.rs (trace/metric/log providers over OTLP/HTTP)
//!
//! Per unit of work:
//!     → ProfiledTracer spans (profiling/correlator.rs)
//!     → signals.rs (request counter, duration histogram, log record)
//!     → batch processors / periodic reader → collector
//!
//! Process diagnostics:
//!     → logging.rs (tracing subscriber, stdout)
//!     → metrics.rs (optional Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Providers live in an explicit `Telemetry` context, not in globals
//! - Export failures are logged and dropped; they never fail a request
//! - Shutdown is bounded and runs once

pub mod logging;
pub mod metrics;
pub mod resource;
pub mod signals;
pub mod telemetry;

pub use resource::{IdentityError, ResourceIdentity};
pub use signals::{RequestLog, RequestSignals, REQUEST_COUNT_METRIC, REQUEST_DURATION_METRIC};
pub use telemetry::{Telemetry, TelemetryError};
