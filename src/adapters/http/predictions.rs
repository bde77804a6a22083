//! Prediction Client - HTTP Adapter for the ML Collaborator
//!
//! Fetches model predictions from the ML service over JSON/HTTP.
//! The sizing core treats the producer as opaque: timeouts, HTTP
//! errors, and malformed payloads all surface as errors the service
//! degrades to an empty prediction set.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::domain::record::ModelPrediction;
use crate::ports::predictions::PredictionSource;

/// HTTP client for the ML prediction service.
///
/// Expects `GET <base_url>/predictions/<symbol>` to return a JSON array
/// of predictions and `GET <base_url>/health` to answer 200 when up.
pub struct HttpPredictionSource {
    http: Client,
    base_url: String,
}

impl HttpPredictionSource {
    /// Create a client for the given base URL and request timeout.
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to build prediction HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PredictionSource for HttpPredictionSource {
    async fn predictions(&self, symbol: &str) -> Result<Vec<ModelPrediction>> {
        let url = format!("{}/predictions/{}", self.base_url, symbol);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("prediction request failed: {url}"))?
            .error_for_status()
            .context("prediction service returned an error status")?;

        let predictions: Vec<ModelPrediction> = response
            .json()
            .await
            .context("malformed prediction payload")?;

        debug!(symbol, count = predictions.len(), "fetched model predictions");
        Ok(predictions)
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(
            self.http.get(&url).send().await,
            Ok(resp) if resp.status().is_success()
        )
    }
}
