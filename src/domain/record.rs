//! Core sizing-domain types.
//!
//! Defines the value types flowing through the sizing pipeline: persisted
//! trade records, transient model predictions, probability estimates, and
//! the final recommendation. All of them are immutable once constructed;
//! malformed input is rejected at the boundary instead of propagating
//! missing-field ambiguity downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ────────────────────────────────────────────
// Trade records (read-only input from the execution layer)
// ────────────────────────────────────────────

/// Which way a trade was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// A completed trade as persisted by the execution layer.
///
/// Append-only and read-only from this crate's perspective: the sizing
/// engine consumes these records, it never creates or mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Instrument symbol (e.g. "NQU25").
    pub symbol: String,
    /// Entry timestamp.
    pub timestamp: DateTime<Utc>,
    /// Fill price at entry.
    pub entry_price: f64,
    /// Fill price at exit.
    pub exit_price: f64,
    /// Contracts traded.
    pub quantity: u32,
    /// Gross profit and loss.
    pub pnl: f64,
    /// Long or short.
    pub side: TradeSide,
    /// Strategy that produced the trade.
    pub strategy_tag: String,
    /// Model confidence recorded at entry, if any.
    pub model_confidence: Option<f64>,
    /// Holding period in seconds.
    pub holding_period_secs: u64,
    /// Commission paid.
    pub commission: f64,
    /// PnL net of commission.
    pub net_pnl: f64,
}

impl TradeRecord {
    /// Boundary validation: reject records that would poison the
    /// statistics (non-finite pnl, empty symbol, zero quantity).
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.is_empty() {
            return Err("empty symbol".to_string());
        }
        if self.quantity == 0 {
            return Err("zero quantity".to_string());
        }
        if !self.pnl.is_finite() || !self.net_pnl.is_finite() {
            return Err(format!("non-finite pnl: {} / {}", self.pnl, self.net_pnl));
        }
        if !self.entry_price.is_finite() || !self.exit_price.is_finite() {
            return Err("non-finite price".to_string());
        }
        if let Some(c) = self.model_confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(format!("model_confidence out of range: {c}"));
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────
// Model predictions (transient input from the ML collaborator)
// ────────────────────────────────────────────

/// Predicted trade direction from a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    /// No directional conviction.
    Flat,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::Flat => write!(f, "flat"),
        }
    }
}

/// A single model's view of the next trade, supplied per estimation call.
/// Not persisted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrediction {
    /// Identifier of the producing model (e.g. "lstm", "ensemble").
    pub model_id: String,
    /// Raw model confidence in [0, 1].
    pub confidence: f64,
    /// Predicted direction.
    pub direction: Direction,
    /// Historical accuracy of this model in [0, 1].
    pub historical_accuracy: f64,
}

impl ModelPrediction {
    /// Boundary validation; predictions failing this are dropped
    /// before estimation.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence out of range: {}", self.confidence));
        }
        if !(0.0..=1.0).contains(&self.historical_accuracy) {
            return Err(format!(
                "historical_accuracy out of range: {}",
                self.historical_accuracy
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────
// Summary statistics over trade history
// ────────────────────────────────────────────

/// Win/loss summary over a set of trade records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    /// Total records considered.
    pub total: usize,
    /// Trades with positive pnl.
    pub wins: usize,
    /// Trades with negative pnl.
    pub losses: usize,
    /// wins / total (0 when empty).
    pub win_rate: f64,
    /// Mean winning pnl (0 when no wins).
    pub avg_win: f64,
    /// Mean losing pnl magnitude (0 when no losses).
    pub avg_loss: f64,
    /// avg_win / avg_loss, neutral 1.0 when either side is missing.
    pub win_loss_ratio: f64,
    /// Sum of pnl across all records.
    pub total_pnl: f64,
}

impl TradeStats {
    /// Neutral statistics for an empty history. The win/loss ratio is
    /// 1.0 rather than 0 so downstream ratio arithmetic stays sane.
    pub fn empty() -> Self {
        Self {
            total: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            win_loss_ratio: 1.0,
            total_pnl: 0.0,
        }
    }

    /// Unweighted statistics over a slice of records. Scratch trades
    /// (pnl == 0) count toward the total but neither side.
    pub fn from_records(records: &[TradeRecord]) -> Self {
        if records.is_empty() {
            return Self::empty();
        }

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut win_sum = 0.0f64;
        let mut loss_sum = 0.0f64;
        let mut total_pnl = 0.0f64;

        for r in records {
            total_pnl += r.pnl;
            if r.pnl > 0.0 {
                wins += 1;
                win_sum += r.pnl;
            } else if r.pnl < 0.0 {
                losses += 1;
                loss_sum += r.pnl.abs();
            }
        }

        let avg_win = if wins > 0 { win_sum / wins as f64 } else { 0.0 };
        let avg_loss = if losses > 0 {
            loss_sum / losses as f64
        } else {
            0.0
        };
        let win_loss_ratio = if avg_loss > 0.0 && avg_win > 0.0 {
            avg_win / avg_loss
        } else {
            1.0
        };

        Self {
            total: records.len(),
            wins,
            losses,
            win_rate: wins as f64 / records.len() as f64,
            avg_win,
            avg_loss,
            win_loss_ratio,
            total_pnl,
        }
    }
}

// ────────────────────────────────────────────
// Pipeline outputs
// ────────────────────────────────────────────

/// Fused probability estimate produced per sizing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityEstimate {
    /// Estimated probability the recommended trade wins, in [0, 1].
    pub win_probability: f64,
    /// Payoff ratio (average win / average loss), >= 0.
    pub win_loss_ratio: f64,
    /// Aggregate confidence in the estimate, in [0, 1].
    pub confidence: f64,
    /// Share of predictions agreeing with the majority direction, in [0, 1].
    pub model_agreement: f64,
    /// Majority direction across predictions.
    pub direction: Direction,
    /// Human-readable summary of the dominant contributing factor.
    pub rationale: String,
}

/// Why a recommendation came back with zero size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Negative or zero Kelly fraction.
    NoEdge,
    /// Scaled fraction fell below the configured minimum.
    BelowMinimum,
    /// Out-of-range probability or non-positive capital.
    InvalidInput,
    /// Fraction was tradeable but capital buys zero contracts.
    InsufficientCapital,
}

/// Outcome of a sizing call, as an explicit tagged variant so callers
/// branch without catching failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    /// Position accepted at the computed size.
    Accepted,
    /// The risk ceiling reduced the computed fraction.
    Capped,
    /// No position taken.
    Rejected(RejectReason),
    /// Risk fraction computed but no pricing data was available to
    /// convert it into contracts.
    Unpriced,
}

impl RecommendationStatus {
    /// Whether this outcome produced a usable sizing signal.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Accepted | Self::Capped)
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Capped => "capped",
            Self::Rejected(_) => "rejected",
            Self::Unpriced => "unpriced",
        }
    }
}

/// Final position-sizing recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyRecommendation {
    /// Unique recommendation id for downstream persistence.
    pub id: Uuid,
    /// Instrument symbol.
    pub symbol: String,
    /// When the recommendation was produced.
    pub timestamp: DateTime<Utc>,
    /// Kelly fraction after scaling and clamping. May be negative for
    /// rejected no-edge outcomes (the raw signal is preserved).
    pub kelly_fraction: f64,
    /// Recommended position size in whole contracts. Always >= 0.
    pub position_size: u32,
    /// Fraction of capital actually placed at risk. Never exceeds the
    /// configured maximum.
    pub capital_risk_fraction: f64,
    /// Confidence inherited from the probability estimate.
    pub confidence: f64,
    /// Model agreement inherited from the probability estimate.
    pub model_agreement: f64,
    /// Recommended direction.
    pub direction: Direction,
    /// Outcome classification.
    pub status: RecommendationStatus,
    /// Human-readable trail of the sizing decision.
    pub rationale: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: "NQU25".to_string(),
            timestamp: Utc::now(),
            entry_price: 23000.0,
            exit_price: 23000.0 + pnl / 20.0,
            quantity: 1,
            pnl,
            side: TradeSide::Long,
            strategy_tag: "trend".to_string(),
            model_confidence: Some(0.7),
            holding_period_secs: 300,
            commission: 2.25,
            net_pnl: pnl - 2.25,
        }
    }

    #[test]
    fn test_stats_empty_history_neutral_prior() {
        let stats = TradeStats::from_records(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.win_loss_ratio, 1.0);
        assert_eq!(stats.total_pnl, 0.0);
    }

    #[test]
    fn test_stats_mixed_history() {
        let records = vec![record(150.0), record(-100.0), record(200.0), record(-120.0)];
        let stats = TradeStats::from_records(&records);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 2);
        assert!((stats.win_rate - 0.5).abs() < 1e-12);
        assert!((stats.avg_win - 175.0).abs() < 1e-9);
        assert!((stats.avg_loss - 110.0).abs() < 1e-9);
        assert!((stats.win_loss_ratio - 175.0 / 110.0).abs() < 1e-9);
        assert!((stats.total_pnl - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_all_wins_keeps_neutral_ratio() {
        let records = vec![record(50.0), record(80.0)];
        let stats = TradeStats::from_records(&records);
        assert_eq!(stats.losses, 0);
        assert_eq!(stats.win_loss_ratio, 1.0);
    }

    #[test]
    fn test_scratch_trades_count_toward_total_only() {
        let records = vec![record(0.0), record(100.0)];
        let stats = TradeStats::from_records(&records);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 0);
        assert!((stats.win_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_trade_record_validation() {
        let good = record(10.0);
        assert!(good.validate().is_ok());

        let mut bad = record(10.0);
        bad.pnl = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = record(10.0);
        bad.symbol.clear();
        assert!(bad.validate().is_err());

        let mut bad = record(10.0);
        bad.model_confidence = Some(1.5);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_prediction_validation() {
        let good = ModelPrediction {
            model_id: "lstm".to_string(),
            confidence: 0.7,
            direction: Direction::Long,
            historical_accuracy: 0.65,
        };
        assert!(good.validate().is_ok());

        let bad = ModelPrediction {
            confidence: 1.2,
            ..good.clone()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_status_serde_round_trip() {
        let status = RecommendationStatus::Rejected(RejectReason::NoEdge);
        let json = serde_json::to_string(&status).unwrap();
        let back: RecommendationStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, back);
        assert!(!status.is_actionable());
        assert!(RecommendationStatus::Capped.is_actionable());
    }
}
