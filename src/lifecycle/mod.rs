//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Identity → Workloads → Profiling → Telemetry → Metrics → Listener
//!     → HTTP server task → Traffic generator task
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server drains → generator exits
//!     → telemetry flush (bounded) → profiler stops
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: identity first, listeners last
//! - Ordered shutdown: producers of telemetry stop before the emitters flush
//! - The final flush has a deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{App, StartupError};
