//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the fault-injection handlers
//! - Wire up middleware (request instrumentation, tower-http tracing)
//! - Serve on a bound listener until the shutdown broadcast fires

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::http::{handlers, middleware};
use crate::observability::Telemetry;
use crate::workload::Workloads;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Arc<Telemetry>,
    pub workloads: Arc<Workloads>,
}

/// HTTP server for the fault-injection routes.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Server over the full route table for `state`.
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/hello", get(handlers::hello))
            .route("/slow", get(handlers::slow))
            .route("/alloc", get(handlers::alloc))
            .route("/cpu", get(handlers::cpu))
            .route_layer(from_fn_with_state(state.clone(), middleware::instrument))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until a value arrives on `shutdown`, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
