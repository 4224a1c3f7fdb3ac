//! Traffic generator subsystem.
//!
//! # Data Flow
//! ```text
//! loop (traffic.rs)
//!     → root span `traffic_generator_request`
//!     → local CPU workload
//!     → GET /slow with traceparent (downstream server span joins the trace)
//!     → span closes → request log + metrics
//!     → random pause (cancellable)
//! ```
//!
//! # Design Decisions
//! - One background task bound to the shutdown broadcast
//! - Downstream calls carry a deadline; a failed call is logged and the loop continues

pub mod traffic;

pub use traffic::{DownstreamError, GeneratorStats, TrafficGenerator, ROOT_SPAN, TARGET_ROUTE};
