//! Prometheus Metrics Registry - Sizing Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers recommendation outcomes, confidence and fraction
//! distributions, and collaborator failures.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::domain::record::KellyRecommendation;

/// Centralized Prometheus metrics for the sizing engine.
///
/// All metrics follow the naming convention `kelly_engine_*`.
pub struct EngineMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Recommendations by outcome status.
    pub recommendations_total: IntCounterVec,
    /// Distribution of final Kelly fractions on actionable calls.
    pub kelly_fraction: Histogram,
    /// Distribution of estimate confidence across calls.
    pub recommendation_confidence: Histogram,
    /// Collaborator failures (history / predictions / market data).
    pub collaborator_errors: IntCounter,
}

impl EngineMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let recommendations_total = IntCounterVec::new(
            Opts::new(
                "kelly_engine_recommendations_total",
                "Total recommendations by outcome status",
            ),
            &["status"],
        )?;

        let kelly_fraction = Histogram::with_opts(
            HistogramOpts::new(
                "kelly_engine_kelly_fraction",
                "Final Kelly fraction per actionable recommendation",
            )
            .buckets(vec![0.001, 0.0025, 0.005, 0.01, 0.015, 0.02, 0.05]),
        )?;

        let recommendation_confidence = Histogram::with_opts(
            HistogramOpts::new(
                "kelly_engine_recommendation_confidence",
                "Estimate confidence per recommendation",
            )
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]),
        )?;

        let collaborator_errors = IntCounter::new(
            "kelly_engine_collaborator_errors_total",
            "Collaborator failures degraded to insufficient data",
        )?;

        registry.register(Box::new(recommendations_total.clone()))?;
        registry.register(Box::new(kelly_fraction.clone()))?;
        registry.register(Box::new(recommendation_confidence.clone()))?;
        registry.register(Box::new(collaborator_errors.clone()))?;

        Ok(Self {
            registry,
            recommendations_total,
            kelly_fraction,
            recommendation_confidence,
            collaborator_errors,
        })
    }

    /// Record one completed recommendation.
    pub fn observe_recommendation(&self, recommendation: &KellyRecommendation) {
        self.recommendations_total
            .with_label_values(&[recommendation.status.label()])
            .inc();
        self.recommendation_confidence
            .observe(recommendation.confidence);
        if recommendation.status.is_actionable() {
            self.kelly_fraction.observe(recommendation.kelly_fraction);
        }
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let registry = metrics_self.registry.clone();
                async move {
                    let encoder = TextEncoder::new();
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    if encoder.encode(&metric_families, &mut buffer).is_err() {
                        return String::new();
                    }
                    String::from_utf8(buffer).unwrap_or_default()
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
