//! demo-app: correlated telemetry workload generator.
//!
//! # Architecture Overview
//!
//! ```text
//!     traffic generator ──GET /slow + traceparent──┐
//!            │                                      ▼
//!            │                      ┌──────────────────────────────┐
//!            │                      │ http: instrumentation layer  │
//!            │                      │   server span Hello/Slow/... │
//!            │                      │ handlers → workloads         │
//!            │                      │   cpu / memory / retention   │
//!            │                      └──────────────┬───────────────┘
//!            ▼                                     ▼
//!     ProfiledTracer ── span attribute ── pyroscope.profile.id
//!            │        └─ thread label ──── span_id ──→ profiling agent
//!            ▼
//!     Telemetry (traces, metrics, logs) ──OTLP/HTTP──→ collector
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use demo_app::config::load_config;
use demo_app::lifecycle::App;
use demo_app::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "demo-app")]
#[command(about = "Synthetic workload generator with correlated traces, logs, metrics and profiles", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Serve requests without the self-driving traffic loop
    #[arg(long)]
    no_generator: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = load_config(cli.config.as_deref(), |config| {
        if let Some(bind) = cli.bind {
            config.listener.bind_address = bind.to_string();
        }
        if cli.no_generator {
            config.generator.enabled = false;
        }
    })?;
    let config = loaded.config;

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        otlp_endpoint = %config.telemetry.otlp_endpoint,
        profiling_server = %config.profiling.server_address,
        env_overrides = ?loaded.env_overrides,
        "demo-app starting"
    );

    let app = App::start(config).await?;
    app.run_until_signal().await;
    Ok(())
}
