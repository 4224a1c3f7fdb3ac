//! Process diagnostics.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber once at startup
//! - Pick the filter from `RUST_LOG`, falling back to the configured level
//! - Render events as pretty text (development) or JSON (production)
//!
//! These are the service's own diagnostics. Request logs meant for the log
//! store go through OTLP instead (see `signals.rs`).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&config.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}

fn default_filter(level: &str) -> String {
    format!("demo_app={level},tower_http={level}")
}
