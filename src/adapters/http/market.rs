//! Market Data Client - HTTP Adapter for Price Snapshots
//!
//! Fetches the current price snapshot used for contract conversion.
//! A 404 means "no data for this symbol right now" and maps to `None`
//! rather than an error - missing pricing is a first-class outcome.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::ports::market_data::{MarketData, MarketSnapshot};

/// HTTP client for the market-data service.
///
/// Expects `GET <base_url>/snapshot/<symbol>` to return a JSON
/// snapshot, 404 when the symbol has no current data, and
/// `GET <base_url>/health` to answer 200 when up.
pub struct HttpMarketData {
    http: Client,
    base_url: String,
}

impl HttpMarketData {
    /// Create a client for the given base URL and request timeout.
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to build market-data HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketData for HttpMarketData {
    async fn snapshot(&self, symbol: &str) -> Result<Option<MarketSnapshot>> {
        let url = format!("{}/snapshot/{}", self.base_url, symbol);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("market-data request failed: {url}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(symbol, "no market data available");
            return Ok(None);
        }

        let snapshot: MarketSnapshot = response
            .error_for_status()
            .context("market-data service returned an error status")?
            .json()
            .await
            .context("malformed market snapshot payload")?;

        debug!(symbol, price = snapshot.price, "fetched market snapshot");
        Ok(Some(snapshot))
    }

    async fn is_healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        matches!(
            self.http.get(&url).send().await,
            Ok(resp) if resp.status().is_success()
        )
    }
}
