//! Market Data Port - Current Price Interface
//!
//! Defines the trait for fetching the current price snapshot used to
//! convert a risk fraction into a contract count. Missing data is a
//! first-class outcome: sizing falls back to a fraction-only result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time market snapshot for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Instrument symbol.
    pub symbol: String,
    /// Last traded price.
    pub price: f64,
    /// Session volume, when the source reports it.
    pub volume: Option<f64>,
    /// Snapshot timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Trait for market-data providers.
#[async_trait]
pub trait MarketData: Send + Sync + 'static {
    /// Current snapshot for a symbol, `None` when no data is available.
    async fn snapshot(&self, symbol: &str) -> anyhow::Result<Option<MarketSnapshot>>;

    /// Whether the market-data source is reachable.
    async fn is_healthy(&self) -> bool;
}
