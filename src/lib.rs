//! Synthetic workload generator producing traces, metrics, logs and
//! continuous profiles that join on shared span identifiers.

pub mod config;
pub mod generator;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod profiling;
pub mod workload;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::{App, Shutdown};
pub use observability::Telemetry;
