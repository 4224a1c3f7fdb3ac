//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower-http trace layer)
//!     → middleware.rs (extract traceparent, open server span, record status)
//!     → handlers.rs (child scope + workload)
//!     → response
//! ```
//!
//! # Design Decisions
//! - Server spans are opened by a route layer so unmatched paths stay untraced
//! - Workloads run synchronously on the worker thread that polls the handler

pub mod handlers;
pub mod middleware;
pub mod propagation;
pub mod server;

pub use propagation::{extract_context, inject_context, HeaderExtractor, HeaderInjector};
pub use server::{AppState, HttpServer};
