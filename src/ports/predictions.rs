//! Prediction Port - ML Model Prediction Interface
//!
//! Defines the trait for obtaining model predictions at sizing time.
//! The core treats the producer as opaque and possibly empty: an empty
//! prediction set degrades to an empirical-only estimate, never an
//! error.

use async_trait::async_trait;

use crate::domain::record::ModelPrediction;

/// Trait for ML prediction providers.
#[async_trait]
pub trait PredictionSource: Send + Sync + 'static {
    /// Current predictions for a symbol. May be empty.
    async fn predictions(&self, symbol: &str) -> anyhow::Result<Vec<ModelPrediction>>;

    /// Whether the prediction service is reachable.
    async fn is_healthy(&self) -> bool;
}
