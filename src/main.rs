//! Kelly Sizing Engine — Entry Point
//!
//! Initializes configuration, logging, collaborator adapters, and the
//! sizing service. Runs until SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create JSONL trade-history store (read-only)
//! 4. Create HTTP prediction + market-data clients
//! 5. Create Prometheus registry and serve /metrics
//! 6. Construct + start KellySizingService (explicit DI, no singletons)
//! 7. Spawn health server (/live, /ready, /health)
//! 8. Run the periodic re-evaluation loop over active symbols
//! 9. Wait for SIGINT → graceful shutdown (stop service → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use kelly_sizing_engine::adapters::http::{HttpMarketData, HttpPredictionSource};
use kelly_sizing_engine::adapters::metrics::{EngineMetrics, HealthServer};
use kelly_sizing_engine::adapters::persistence::JsonlHistoryStore;
use kelly_sizing_engine::config::{self, AppConfig};
use kelly_sizing_engine::usecases::sizing_service::{KellySizingService, SizingRequest};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.engine.log_level)
            }),
        )
        .json()
        .init();

    info!(
        name = %config.engine.name,
        version = env!("CARGO_PKG_VERSION"),
        symbols = config.symbols.len(),
        "Starting Kelly sizing engine"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Collaborator adapters ────────────────────────────
    let history = Arc::new(JsonlHistoryStore::new(&config.history.data_dir));
    let predictions = Arc::new(
        HttpPredictionSource::new(
            &config.collaborators.prediction_url,
            config.collaborators.timeout_ms,
        )
        .context("Failed to create prediction client")?,
    );
    let market_data = Arc::new(
        HttpMarketData::new(
            &config.collaborators.market_data_url,
            config.collaborators.timeout_ms,
        )
        .context("Failed to create market-data client")?,
    );

    // ── 5. Prometheus metrics registry ──────────────────────
    let metrics = Arc::new(EngineMetrics::new().context("Failed to create metrics registry")?);
    let mut metrics_handle = None;
    if config.metrics.enabled {
        let metrics_shutdown = shutdown_tx.subscribe();
        let bind = config.metrics.bind_address.clone();
        let registry = Arc::clone(&metrics);
        metrics_handle = Some(tokio::spawn(async move {
            if let Err(e) = registry.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }));
    }

    // ── 6. Construct + start the sizing service ─────────────
    let service = Arc::new(
        KellySizingService::new(&config, history, predictions, market_data)
            .with_metrics(Arc::clone(&metrics)),
    );
    service
        .start()
        .await
        .context("Failed to start sizing service")?;

    // ── 7. Health server ────────────────────────────────────
    let health_shutdown = shutdown_tx.subscribe();
    let health_server = HealthServer::new(Arc::clone(&service), config.metrics.health_port);
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    // ── 8. Periodic re-evaluation loop ──────────────────────
    let loop_shutdown = shutdown_tx.subscribe();
    let loop_service = Arc::clone(&service);
    let loop_config = config.clone();
    let loop_handle = tokio::spawn(async move {
        run_evaluation_loop(loop_config, loop_service, loop_shutdown).await;
    });

    info!("All tasks spawned — engine is running");

    // ── 9. Wait for SIGINT ──────────────────────────────────
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }

    // Graceful shutdown: stop accepting calls, then stop servers.
    service.stop().await;
    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(10), loop_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Re-evaluate every active symbol on the configured interval until
/// shutdown. Individual failures are logged and never end the loop.
async fn run_evaluation_loop(
    config: AppConfig,
    service: Arc<KellySizingService>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let active: Vec<String> = config
        .symbols
        .iter()
        .filter(|s| s.active)
        .map(|s| s.symbol.clone())
        .collect();

    if active.is_empty() {
        warn!("No active symbols configured — evaluation loop idle");
        let _ = shutdown_rx.recv().await;
        return;
    }

    let interval = Duration::from_secs(config.engine.evaluation_interval_seconds);
    info!(
        symbols = active.len(),
        interval_seconds = interval.as_secs(),
        "Evaluation loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("Evaluation loop received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                for symbol in &active {
                    match service.recommend(SizingRequest::for_symbol(symbol)).await {
                        Ok(rec) => {
                            info!(
                                symbol = %symbol,
                                status = rec.status.label(),
                                position_size = rec.position_size,
                                kelly_fraction = rec.kelly_fraction,
                                confidence = rec.confidence,
                                "scheduled evaluation"
                            );
                        }
                        Err(e) => {
                            error!(symbol = %symbol, error = %e, "scheduled evaluation failed");
                        }
                    }
                }
            }
        }
    }

    info!("Evaluation loop stopped cleanly");
}
