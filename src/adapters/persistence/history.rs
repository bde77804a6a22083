//! Trade History Reader - Append-only JSONL Trade Records
//!
//! Reads the execution layer's daily JSONL trade logs from
//! `<data_dir>/trades/YYYY-MM-DD.jsonl`. Each line is a self-contained
//! JSON record. This adapter is strictly read-only: the execution layer
//! owns all writes, and records are never mutated or deleted here.
//!
//! A missing directory or unreadable file degrades to an empty result
//! with a warning - the sizing path treats it as insufficient data.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::record::TradeRecord;
use crate::ports::trade_history::{HistoryFilter, TradeHistory};

/// Read-only accessor over daily JSONL trade files.
pub struct JsonlHistoryStore {
    /// Directory holding `YYYY-MM-DD.jsonl` files.
    trades_dir: PathBuf,
}

impl JsonlHistoryStore {
    /// Create a store rooted at the given data directory.
    pub fn new(data_dir: &str) -> Self {
        Self {
            trades_dir: Path::new(data_dir).join("trades"),
        }
    }

    /// Daily files older than the lookback window can be skipped by
    /// filename alone; unparseable names are read anyway.
    fn file_in_window(path: &Path, lookback_days: Option<u32>) -> bool {
        let Some(days) = lookback_days else {
            return true;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return true;
        };
        match NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
            Ok(date) => {
                let cutoff = (Utc::now() - Duration::days(i64::from(days))).date_naive();
                date >= cutoff
            }
            Err(_) => true,
        }
    }
}

#[async_trait]
impl TradeHistory for JsonlHistoryStore {
    async fn load(&self, filter: HistoryFilter) -> anyhow::Result<Vec<TradeRecord>> {
        let mut entries = match fs::read_dir(&self.trades_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    dir = %self.trades_dir.display(),
                    error = %e,
                    "trade directory unavailable, returning empty history"
                );
                return Ok(Vec::new());
            }
        };

        let cutoff = filter
            .lookback_days
            .map(|days| Utc::now() - Duration::days(i64::from(days)));

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "jsonl") {
                continue;
            }
            if !Self::file_in_window(&path, filter.lookback_days) {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable trade file");
                    continue;
                }
            };

            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<TradeRecord>(line) {
                    Ok(record) => {
                        if let Err(e) = record.validate() {
                            warn!(
                                file = %path.display(),
                                error = %e,
                                "skipping invalid trade record"
                            );
                            continue;
                        }
                        records.push(record);
                    }
                    Err(e) => {
                        warn!(
                            file = %path.display(),
                            error = %e,
                            "skipping malformed trade record"
                        );
                    }
                }
            }
        }

        if let Some(symbol) = &filter.symbol {
            records.retain(|r| &r.symbol == symbol);
        }
        if let Some(cutoff) = cutoff {
            records.retain(|r| r.timestamp >= cutoff);
        }

        // Newest-first is the accessor contract.
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }

        debug!(count = records.len(), "loaded trade records");
        Ok(records)
    }

    async fn is_available(&self) -> bool {
        fs::metadata(&self.trades_dir).await.is_ok()
    }
}
