//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes `/live`, `/ready`, and `/health` endpoints via axum for
//! Docker health checks and monitoring. Readiness follows the sizing
//! service's lifecycle state; `/health` returns the full JSON health
//! snapshot for health-check callers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::usecases::sizing_service::{KellySizingService, ServiceState};

/// Axum-based health check HTTP server.
///
/// Serves liveness (`/live`), readiness (`/ready`), and the full
/// health snapshot (`/health`) for orchestrator probes and dashboards.
pub struct HealthServer {
    /// The sizing service whose health is reported.
    service: Arc<KellySizingService>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(service: Arc<KellySizingService>, port: u16) -> Self {
        Self { service, port }
    }

    /// Run the health check server until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .route("/health", get(Self::health))
            .with_state(Arc::clone(&self.service));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 while the service accepts sizing calls.
    async fn readiness(State(service): State<Arc<KellySizingService>>) -> impl IntoResponse {
        match service.health().status {
            ServiceState::Running | ServiceState::Degraded => (StatusCode::OK, "READY"),
            _ => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY"),
        }
    }

    /// Full health snapshot as JSON.
    async fn health(State(service): State<Arc<KellySizingService>>) -> impl IntoResponse {
        Json(service.health())
    }
}
