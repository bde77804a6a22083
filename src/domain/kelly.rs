//! Kelly Criterion position sizing.
//!
//! Implements fractional Kelly for optimal capital allocation.
//! Full Kelly maximizes long-run geometric growth but is provably too
//! aggressive under parameter uncertainty, so the calculator scales the
//! raw fraction down (half-Kelly by default), shrinks it further by model
//! confidence, and clamps the result under a hard capital-risk ceiling
//! before converting to whole contracts.
//!
//! Exposes the pure formula (`kelly_fraction`) and the stateful
//! `KellyCalculator` that produces a full `KellyRecommendation`.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::KellyConfig;
use crate::domain::record::{
    KellyRecommendation, ProbabilityEstimate, RecommendationStatus, RejectReason,
};

/// Programming-error signals from the sizing formula itself. Fatal for
/// the call, never for the service.
#[derive(Debug, Error)]
pub enum KellyError {
    /// A computed fraction left [-1, 1] or stopped being finite before
    /// clamping, meaning the formula implementation is wrong.
    #[error("sizing invariant violated: {0}")]
    InvariantViolation(String),
}

/// Kelly formula for a single-outcome bet.
///
///   f* = p - (1 - p) / b
///
/// where `p` is the win probability and `b` the win/loss payoff ratio.
/// `b == 0` means losses are total wipeouts; the formula degrades to the
/// binary-payoff form `2p - 1` instead of dividing by zero. The result
/// may be negative: that is the "no edge, do not bet" signal.
pub fn kelly_fraction(win_probability: f64, win_loss_ratio: f64) -> f64 {
    if win_loss_ratio > 0.0 {
        win_probability - (1.0 - win_probability) / win_loss_ratio
    } else {
        2.0 * win_probability - 1.0
    }
}

/// Expected logarithmic growth rate per period for a given bet fraction.
///
/// E[log growth] = p·ln(1 + f·b) + (1-p)·ln(1 - f)
///
/// Returns negative infinity for f >= 1 (certain ruin on a loss).
pub fn expected_growth_rate(fraction: f64, win_probability: f64, win_loss_ratio: f64) -> f64 {
    if fraction <= 0.0 {
        return 0.0;
    }
    if fraction >= 1.0 {
        return f64::NEG_INFINITY;
    }
    let p = win_probability;
    let q = 1.0 - p;
    p * (1.0 + fraction * win_loss_ratio).ln() + q * (1.0 - fraction).ln()
}

/// Calculator carrying the configured risk limits.
///
/// All thresholds come from [`KellyConfig`]; nothing is hardcoded so the
/// blending and clamping shape survives retuning.
#[derive(Debug, Clone)]
pub struct KellyCalculator {
    /// Fractional Kelly multiplier (0.5 = half-Kelly).
    fraction_multiplier: f64,
    /// Hard ceiling on capital at risk per position.
    max_risk_fraction: f64,
    /// Fractions below this are not worth trading.
    min_fraction: f64,
    /// Maximum contracts per position.
    max_contracts: u32,
    /// Confidence at which no extra shrinkage applies.
    full_confidence: f64,
    /// Total portfolio risk budget.
    max_portfolio_risk: f64,
}

impl KellyCalculator {
    /// Create a calculator from validated config.
    pub fn new(config: &KellyConfig) -> Self {
        Self {
            fraction_multiplier: config.fraction_multiplier,
            max_risk_fraction: config.max_risk_fraction,
            min_fraction: config.min_fraction,
            max_contracts: config.max_contracts,
            full_confidence: config.full_confidence,
            max_portfolio_risk: config.max_portfolio_risk,
        }
    }

    /// The configured hard risk ceiling.
    pub fn max_risk_fraction(&self) -> f64 {
        self.max_risk_fraction
    }

    /// Produce a position recommendation from a probability estimate.
    ///
    /// Financial inputs are untrusted: out-of-range probabilities and
    /// non-positive capital yield a rejected zero-size recommendation,
    /// never a panic or error. The only error path is an internal
    /// invariant violation (a non-finite or out-of-band fraction), which
    /// indicates a bug in the formula itself.
    ///
    /// `contract_value` is the capital consumed per contract (margin or
    /// notional per the symbol spec). `None` means pricing data is
    /// unavailable and the result stays fraction-only (`Unpriced`).
    pub fn recommend(
        &self,
        symbol: &str,
        estimate: &ProbabilityEstimate,
        account_capital: f64,
        contract_value: Option<f64>,
        current_portfolio_risk: f64,
    ) -> Result<KellyRecommendation, KellyError> {
        let p = estimate.win_probability;
        let ratio = estimate.win_loss_ratio;

        // Untrusted-input gate: reject, never raise.
        if !p.is_finite()
            || !(0.0..=1.0).contains(&p)
            || !ratio.is_finite()
            || ratio < 0.0
            || !account_capital.is_finite()
            || account_capital <= 0.0
        {
            return Ok(self.rejection(
                symbol,
                estimate,
                0.0,
                RejectReason::InvalidInput,
                format!(
                    "invalid inputs: p={p:.4}, ratio={ratio:.4}, capital={account_capital:.2}"
                ),
            ));
        }

        let raw = kelly_fraction(p, ratio);
        if !raw.is_finite() {
            return Err(KellyError::InvariantViolation(format!(
                "raw kelly fraction not finite for p={p}, ratio={ratio}"
            )));
        }

        if raw <= 0.0 {
            // Preserve the negative fraction: callers can see how far
            // from an edge the inputs were.
            return Ok(self.rejection(
                symbol,
                estimate,
                raw,
                RejectReason::NoEdge,
                format!("no edge: raw kelly {raw:.4}"),
            ));
        }

        let confidence_factor = (estimate.confidence / self.full_confidence).min(1.0);
        let scaled = raw * self.fraction_multiplier * confidence_factor;
        if !scaled.is_finite() || scaled.abs() > 1.0 {
            return Err(KellyError::InvariantViolation(format!(
                "scaled fraction {scaled} outside [-1, 1] (raw {raw})"
            )));
        }

        let headroom = self.max_portfolio_risk - current_portfolio_risk;
        if headroom <= 0.0 {
            return Ok(self.rejection(
                symbol,
                estimate,
                0.0,
                RejectReason::BelowMinimum,
                format!(
                    "portfolio risk budget exhausted: current {current_portfolio_risk:.4} >= max {:.4}",
                    self.max_portfolio_risk
                ),
            ));
        }

        // Hard safety ceiling, never exceeded regardless of the formula.
        let bounded = scaled.min(headroom).min(self.max_risk_fraction);
        let was_capped = bounded < scaled;

        if bounded < self.min_fraction {
            return Ok(self.rejection(
                symbol,
                estimate,
                bounded,
                RejectReason::BelowMinimum,
                format!(
                    "fraction {bounded:.4} below minimum {:.4} (raw {raw:.4})",
                    self.min_fraction
                ),
            ));
        }

        debug!(
            symbol,
            raw,
            scaled,
            bounded,
            capped = was_capped,
            "kelly fraction computed"
        );

        let Some(cv) = contract_value.filter(|v| v.is_finite() && *v > 0.0) else {
            return Ok(KellyRecommendation {
                id: Uuid::new_v4(),
                symbol: symbol.to_string(),
                timestamp: Utc::now(),
                kelly_fraction: bounded,
                position_size: 0,
                capital_risk_fraction: bounded,
                confidence: estimate.confidence,
                model_agreement: estimate.model_agreement,
                direction: estimate.direction,
                status: RecommendationStatus::Unpriced,
                rationale: format!(
                    "raw {raw:.4} | scaled {scaled:.4} | final {bounded:.4} | no pricing data, fraction-only"
                ),
            });
        };

        // Contract conversion in exact decimal arithmetic: floor, then
        // recompute the realized risk so it never exceeds the ceiling.
        let frac = Decimal::from_f64(bounded).unwrap_or(Decimal::ZERO);
        let capital = Decimal::from_f64(account_capital).unwrap_or(Decimal::ZERO);
        let value = Decimal::from_f64(cv).unwrap_or(Decimal::ONE);
        let ideal = (frac * capital / value).floor();
        let affordable = ideal.to_u32().unwrap_or(u32::MAX);

        if affordable == 0 {
            return Ok(self.rejection(
                symbol,
                estimate,
                bounded,
                RejectReason::InsufficientCapital,
                format!(
                    "fraction {bounded:.4} of {account_capital:.0} buys zero contracts at {cv:.2}"
                ),
            ));
        }

        let contracts = affordable.min(self.max_contracts);
        let size_capped = contracts < affordable;
        let risk = (Decimal::from(contracts) * value / capital)
            .to_f64()
            .unwrap_or(0.0);

        let status = if was_capped || size_capped {
            RecommendationStatus::Capped
        } else {
            RecommendationStatus::Accepted
        };

        Ok(KellyRecommendation {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            kelly_fraction: bounded,
            position_size: contracts,
            capital_risk_fraction: risk,
            confidence: estimate.confidence,
            model_agreement: estimate.model_agreement,
            direction: estimate.direction,
            status,
            rationale: format!(
                "raw {raw:.4} | scaled {scaled:.4} | final {bounded:.4} | {contracts} contracts @ {cv:.2}"
            ),
        })
    }

    fn rejection(
        &self,
        symbol: &str,
        estimate: &ProbabilityEstimate,
        fraction: f64,
        reason: RejectReason,
        rationale: String,
    ) -> KellyRecommendation {
        KellyRecommendation {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            kelly_fraction: fraction,
            position_size: 0,
            capital_risk_fraction: 0.0,
            confidence: estimate.confidence,
            model_agreement: estimate.model_agreement,
            direction: estimate.direction,
            status: RecommendationStatus::Rejected(reason),
            rationale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::Direction;

    fn estimate(p: f64, ratio: f64, confidence: f64) -> ProbabilityEstimate {
        ProbabilityEstimate {
            win_probability: p,
            win_loss_ratio: ratio,
            confidence,
            model_agreement: 1.0,
            direction: Direction::Long,
            rationale: String::new(),
        }
    }

    fn calculator() -> KellyCalculator {
        KellyCalculator::new(&KellyConfig::default())
    }

    #[test]
    fn test_no_edge_is_zero() {
        assert_eq!(kelly_fraction(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_positive_edge_regression_cases() {
        assert!((kelly_fraction(0.6, 2.0) - 0.4).abs() < 1e-12);
        assert!((kelly_fraction(0.7, 1.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_negative_edge_is_negative() {
        assert!(kelly_fraction(0.4, 1.0) < 0.0);
        assert!(kelly_fraction(0.3, 0.5) < 0.0);
    }

    #[test]
    fn test_zero_ratio_degrades_to_binary_form() {
        // Total-wipeout losses: f = 2p - 1.
        assert!((kelly_fraction(0.8, 0.0) - 0.6).abs() < 1e-12);
        assert!((kelly_fraction(0.5, 0.0)).abs() < 1e-12);
        assert!(kelly_fraction(0.3, 0.0) < 0.0);
    }

    #[test]
    fn test_monotonic_in_probability() {
        let mut last = kelly_fraction(0.0, 2.0);
        for i in 1..=100 {
            let p = i as f64 / 100.0;
            let f = kelly_fraction(p, 2.0);
            assert!(f > last, "kelly must increase with p: f({p})={f} <= {last}");
            last = f;
        }
    }

    #[test]
    fn test_growth_rate_peaks_at_full_kelly() {
        let p = 0.6;
        let b = 2.0;
        let full = kelly_fraction(p, b);
        let at_full = expected_growth_rate(full, p, b);
        assert!(at_full > expected_growth_rate(full * 0.5, p, b));
        assert!(at_full > expected_growth_rate(full * 1.5, p, b));
        assert_eq!(expected_growth_rate(0.0, p, b), 0.0);
        assert_eq!(expected_growth_rate(1.0, p, b), f64::NEG_INFINITY);
    }

    #[test]
    fn test_recommend_accepts_positive_edge() {
        let calc = calculator();
        let rec = calc
            .recommend("NQU25", &estimate(0.62, 1.8, 0.8), 500_000.0, Some(2_000.0), 0.0)
            .unwrap();
        assert!(rec.status.is_actionable());
        assert!(rec.position_size >= 1);
        assert!(rec.capital_risk_fraction <= calc.max_risk_fraction() + 1e-12);
    }

    #[test]
    fn test_recommend_rejects_no_edge() {
        let calc = calculator();
        let rec = calc
            .recommend("NQU25", &estimate(0.45, 1.0, 0.9), 100_000.0, Some(500.0), 0.0)
            .unwrap();
        assert_eq!(
            rec.status,
            RecommendationStatus::Rejected(RejectReason::NoEdge)
        );
        assert_eq!(rec.position_size, 0);
        assert!(rec.kelly_fraction < 0.0, "raw negative fraction preserved");
        assert_eq!(rec.capital_risk_fraction, 0.0);
    }

    #[test]
    fn test_recommend_rejects_invalid_inputs() {
        let calc = calculator();
        for (p, ratio, capital) in [
            (1.5, 1.0, 100_000.0),
            (-0.1, 1.0, 100_000.0),
            (0.6, -1.0, 100_000.0),
            (0.6, 1.5, 0.0),
            (0.6, 1.5, -5_000.0),
            (f64::NAN, 1.5, 100_000.0),
        ] {
            let rec = calc
                .recommend("NQU25", &estimate(p, ratio, 0.8), capital, Some(500.0), 0.0)
                .unwrap();
            assert_eq!(
                rec.status,
                RecommendationStatus::Rejected(RejectReason::InvalidInput),
                "p={p} ratio={ratio} capital={capital}"
            );
            assert_eq!(rec.position_size, 0);
        }
    }

    #[test]
    fn test_risk_ceiling_never_exceeded() {
        let calc = calculator();
        // Huge edge: raw kelly near 0.9, should clamp to the 2% ceiling.
        let rec = calc
            .recommend("NQU25", &estimate(0.95, 10.0, 1.0), 1_000_000.0, Some(100.0), 0.0)
            .unwrap();
        assert!(rec.capital_risk_fraction <= calc.max_risk_fraction() + 1e-12);
        assert_eq!(rec.status, RecommendationStatus::Capped);
    }

    #[test]
    fn test_low_confidence_shrinks_position() {
        // Raise the ceiling so the confidence scaling is visible.
        let config = KellyConfig {
            max_risk_fraction: 0.5,
            max_portfolio_risk: 1.0,
            max_contracts: 1_000,
            ..KellyConfig::default()
        };
        let calc = KellyCalculator::new(&config);
        let high = calc
            .recommend("NQU25", &estimate(0.60, 1.8, 0.8), 500_000.0, Some(500.0), 0.0)
            .unwrap();
        let low = calc
            .recommend("NQU25", &estimate(0.60, 1.8, 0.2), 500_000.0, Some(500.0), 0.0)
            .unwrap();
        assert!(low.kelly_fraction < high.kelly_fraction);
        assert!(low.position_size < high.position_size);
    }

    #[test]
    fn test_unpriced_when_no_contract_value() {
        let calc = calculator();
        let rec = calc
            .recommend("NQU25", &estimate(0.62, 1.8, 0.8), 100_000.0, None, 0.0)
            .unwrap();
        assert_eq!(rec.status, RecommendationStatus::Unpriced);
        assert_eq!(rec.position_size, 0);
        assert!(rec.capital_risk_fraction > 0.0, "fraction-only result kept");
    }

    #[test]
    fn test_insufficient_capital_rejected() {
        let calc = calculator();
        // 2% of 10k = 200, far below one 230k ES contract.
        let rec = calc
            .recommend("ESU25", &estimate(0.65, 2.0, 0.9), 10_000.0, Some(230_000.0), 0.0)
            .unwrap();
        assert_eq!(
            rec.status,
            RecommendationStatus::Rejected(RejectReason::InsufficientCapital)
        );
        assert_eq!(rec.position_size, 0);
    }

    #[test]
    fn test_max_contracts_cap() {
        let calc = calculator();
        // Tiny contract value so the fraction affords far more than max.
        let rec = calc
            .recommend("NQU25", &estimate(0.70, 2.0, 1.0), 10_000_000.0, Some(10.0), 0.0)
            .unwrap();
        assert_eq!(rec.position_size, KellyConfig::default().max_contracts);
        assert_eq!(rec.status, RecommendationStatus::Capped);
    }

    #[test]
    fn test_portfolio_budget_bounds_fraction() {
        let calc = calculator();
        // Only 0.8% headroom left out of the 20% portfolio budget.
        let rec = calc
            .recommend("NQU25", &estimate(0.70, 2.0, 1.0), 1_000_000.0, Some(100.0), 0.192)
            .unwrap();
        assert!(rec.capital_risk_fraction <= 0.008 + 1e-9);

        let exhausted = calc
            .recommend("NQU25", &estimate(0.70, 2.0, 1.0), 1_000_000.0, Some(100.0), 0.25)
            .unwrap();
        assert_eq!(
            exhausted.status,
            RecommendationStatus::Rejected(RejectReason::BelowMinimum)
        );
    }

    #[test]
    fn test_deterministic_given_fixed_inputs() {
        let calc = calculator();
        let est = estimate(0.63, 1.7, 0.75);
        let a = calc
            .recommend("NQU25", &est, 250_000.0, Some(1_500.0), 0.0)
            .unwrap();
        let b = calc
            .recommend("NQU25", &est, 250_000.0, Some(1_500.0), 0.0)
            .unwrap();
        assert_eq!(a.kelly_fraction, b.kelly_fraction);
        assert_eq!(a.position_size, b.position_size);
        assert_eq!(a.capital_risk_fraction, b.capital_risk_fraction);
        assert_eq!(a.status, b.status);
    }
}
