//! Trade History Port - Read-only Trade Record Access
//!
//! Defines the trait for loading persisted trade records. The sizing
//! core only ever reads trade history; the execution layer owns all
//! writes. Each `load` call is independent and restartable - no
//! iterator state is retained between calls.

use async_trait::async_trait;
use tracing::warn;

use crate::domain::record::{TradeRecord, TradeStats};

/// Query filter for trade-history loads.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Restrict to one instrument (None for all).
    pub symbol: Option<String>,
    /// Only records newer than this many days (None for all).
    pub lookback_days: Option<u32>,
    /// Maximum records returned (None for all).
    pub limit: Option<usize>,
}

impl HistoryFilter {
    /// Filter for a single symbol with the given window and limit.
    pub fn for_symbol(symbol: &str, lookback_days: u32, limit: usize) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            lookback_days: Some(lookback_days),
            limit: Some(limit),
        }
    }
}

/// Trait for trade-history providers.
///
/// Implementors return records ordered newest-first. An unavailable
/// backing store must degrade (empty results, `is_available` false)
/// rather than fail the sizing path.
#[async_trait]
pub trait TradeHistory: Send + Sync + 'static {
    /// Load trade records matching the filter, newest-first.
    async fn load(&self, filter: HistoryFilter) -> anyhow::Result<Vec<TradeRecord>>;

    /// Whether the backing store is reachable.
    async fn is_available(&self) -> bool;

    /// Win/loss summary statistics, optionally per symbol.
    ///
    /// Empty history yields the neutral prior (win rate 0, ratio 1.0).
    async fn statistics(&self, symbol: Option<&str>) -> anyhow::Result<TradeStats> {
        let filter = HistoryFilter {
            symbol: symbol.map(str::to_string),
            ..HistoryFilter::default()
        };
        let records = self.load(filter).await?;
        Ok(TradeStats::from_records(&records))
    }

    /// Precondition gate for the estimator: is there enough history?
    ///
    /// Store absence is not fatal - it degrades to "insufficient data".
    async fn verify_sufficient(&self, min_count: usize) -> bool {
        if !self.is_available().await {
            return false;
        }
        let filter = HistoryFilter {
            // A few extra so a short read does not flap at the boundary.
            limit: Some(min_count + 5),
            ..HistoryFilter::default()
        };
        match self.load(filter).await {
            Ok(records) => records.len() >= min_count,
            Err(e) => {
                warn!(error = %e, "trade history unavailable during sufficiency check");
                false
            }
        }
    }
}
