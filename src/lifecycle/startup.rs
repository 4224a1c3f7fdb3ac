//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order:
//!   profiling → telemetry → metrics → listener → server → generator
//! - Stop them in reverse: server → generator → telemetry flush → profiler
//!
//! # Design Decisions
//! - Fail fast: identity, pattern and bind errors are fatal
//! - Export and profiling failures degrade instead of aborting
//! - Logging is initialized by the caller, before anything here runs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};

use crate::config::AppConfig;
use crate::generator::{DownstreamError, GeneratorStats, TrafficGenerator};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{metrics, IdentityError, ResourceIdentity, Telemetry};
use crate::profiling::Profiling;
use crate::workload::Workloads;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid service identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("failed to compile workload pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("failed to build traffic generator: {0}")]
    Generator(#[from] DownstreamError),

    #[error("background task failed: {0}")]
    Task(#[from] JoinError),
}

/// The running application.
pub struct App {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    server: JoinHandle<Result<(), std::io::Error>>,
    generator: Option<(JoinHandle<()>, Arc<GeneratorStats>)>,
    telemetry: Arc<Telemetry>,
    shutdown_timeout: Duration,
    profiling: Profiling,
}

impl App {
    /// Start every subsystem and begin serving.
    pub async fn start(config: AppConfig) -> Result<Self, StartupError> {
        let identity = ResourceIdentity::from_config(&config.telemetry)?;
        let workloads = Arc::new(Workloads::new(config.workload.clone())?);

        let profiling = Profiling::start(&config.profiling);

        let telemetry = {
            let telemetry_config = config.telemetry.clone();
            let identity = identity.clone();
            let labels = profiling.labels();
            tokio::task::spawn_blocking(move || {
                Telemetry::init(&telemetry_config, &identity, labels)
            })
            .await?
        };
        let telemetry = Arc::new(telemetry);

        if config.observability.metrics_enabled {
            let addr: SocketAddr = config
                .observability
                .metrics_address
                .parse()
                .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
            metrics::init_metrics(addr)?;
        }

        let listener = TcpListener::bind(&config.listener.bind_address)
            .await
            .map_err(|source| StartupError::Bind {
                address: config.listener.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

        let shutdown = Shutdown::new();
        let state = AppState {
            telemetry: Arc::clone(&telemetry),
            workloads: Arc::clone(&workloads),
        };
        let server = tokio::spawn(HttpServer::new(state).run(listener, shutdown.subscribe()));

        let generator = if config.generator.enabled {
            let generator = TrafficGenerator::new(
                config.generator.clone(),
                &config.generator.target_for(local_addr),
                Arc::clone(&telemetry),
                workloads.email.clone(),
            )?;
            let stats = generator.stats();
            Some((generator.spawn(shutdown.subscribe()), stats))
        } else {
            tracing::info!("Traffic generator disabled");
            None
        };

        tracing::info!(
            address = %local_addr,
            service_name = identity.service_name(),
            generator = config.generator.enabled,
            "demo-app started"
        );

        Ok(Self {
            local_addr,
            shutdown,
            server,
            generator,
            telemetry,
            shutdown_timeout: Duration::from_secs(config.telemetry.shutdown_timeout_secs),
            profiling,
        })
    }

    /// Address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared telemetry context.
    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Generator counters, `None` when the generator is disabled.
    pub fn generator_stats(&self) -> Option<Arc<GeneratorStats>> {
        self.generator.as_ref().map(|(_, stats)| Arc::clone(stats))
    }

    /// Serve until SIGINT or SIGTERM, then stop.
    pub async fn run_until_signal(self) {
        signals::wait_for_signal().await;
        self.stop().await;
    }

    /// Stop in reverse start order. Failures are logged; the remaining steps
    /// still run.
    pub async fn stop(self) {
        self.shutdown.trigger();

        match self.server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = %err, "HTTP server failed"),
            Err(err) => tracing::error!(error = %err, "HTTP server task panicked"),
        }

        if let Some((handle, stats)) = self.generator {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "Traffic generator task panicked");
            }
            tracing::info!(
                iterations = stats.iterations(),
                successes = stats.successes(),
                failures = stats.failures(),
                "Traffic generator finished"
            );
        }

        if let Err(err) = self.telemetry.shutdown(self.shutdown_timeout).await {
            tracing::error!(error = %err, "Telemetry shutdown failed");
        }

        self.profiling.stop();
        tracing::info!("Shutdown complete");
    }
}
