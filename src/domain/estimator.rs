//! Probability estimator for Kelly sizing.
//!
//! Fuses independent model predictions with empirical trade history into
//! a single win-probability / payoff-ratio estimate. The empirical side
//! uses exponential recency weighting so the estimate tracks regime
//! changes without discarding long-run signal; the model side calibrates
//! each prediction by its historical accuracy and weighs the blend by
//! how strongly the models agree and how much history backs them up.
//!
//! Never fails: empty inputs degrade to a neutral, zero-confidence
//! estimate.

use tracing::{debug, warn};

use crate::config::EstimatorConfig;
use crate::domain::record::{Direction, ModelPrediction, ProbabilityEstimate, TradeRecord};

/// Recency-weighted empirical statistics over newest-first records.
#[derive(Debug, Clone, Copy)]
struct WeightedStats {
    win_rate: f64,
    win_loss_ratio: f64,
    samples: usize,
}

/// Aggregated view of the model predictions.
#[derive(Debug, Clone, Copy)]
struct ModelConsensus {
    probability: f64,
    agreement: f64,
    avg_confidence: f64,
    direction: Direction,
    agreeing: usize,
    total: usize,
}

/// Fuses model predictions and trade history into a probability estimate.
///
/// All weighting coefficients come from [`EstimatorConfig`]: the blending
/// shape is the contract, the numbers are tuning.
#[derive(Debug, Clone)]
pub struct ProbabilityEstimator {
    /// Half-life of the recency weighting, in trades.
    half_life: f64,
    /// History size at which the sufficiency term reaches 0.5.
    min_trades: usize,
    /// Prediction count at which model trust saturates halfway.
    prediction_saturation: f64,
    /// Weight of the model term in the confidence mix.
    confidence_model_weight: f64,
}

impl ProbabilityEstimator {
    /// Create an estimator from validated config.
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            half_life: config.recency_half_life_trades,
            min_trades: config.min_trades,
            prediction_saturation: config.prediction_saturation,
            confidence_model_weight: config.confidence_model_weight,
        }
    }

    /// Estimate the win probability and payoff ratio for `symbol`.
    ///
    /// `history` must be ordered newest-first (the accessor contract).
    /// Malformed predictions are dropped with a warning rather than
    /// poisoning the aggregate.
    pub fn estimate(
        &self,
        predictions: &[ModelPrediction],
        history: &[TradeRecord],
        symbol: &str,
    ) -> ProbabilityEstimate {
        let valid: Vec<&ModelPrediction> = predictions
            .iter()
            .filter(|p| match p.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(symbol, model = %p.model_id, error = %e, "dropping malformed prediction");
                    false
                }
            })
            .collect();

        let empirical = self.weighted_stats(history);
        let sufficiency = self.history_sufficiency(empirical.samples);
        let consensus = self.aggregate(&valid);

        let Some(models) = consensus else {
            // No usable predictions: empirical only, or fully neutral.
            if empirical.samples == 0 {
                return ProbabilityEstimate {
                    win_probability: 0.5,
                    win_loss_ratio: 1.0,
                    confidence: 0.0,
                    model_agreement: 0.0,
                    direction: Direction::Flat,
                    rationale: "insufficient data: no predictions and no trade history"
                        .to_string(),
                };
            }
            return ProbabilityEstimate {
                win_probability: empirical.win_rate.clamp(0.0, 1.0),
                win_loss_ratio: empirical.win_loss_ratio,
                confidence: ((1.0 - self.confidence_model_weight) * sufficiency)
                    .clamp(0.0, 1.0),
                model_agreement: 0.0,
                direction: Direction::Flat,
                rationale: format!(
                    "historical edge only: win rate {:.3} over {} trades, W/L {:.3}",
                    empirical.win_rate, empirical.samples, empirical.win_loss_ratio
                ),
            };
        };

        // Model trust grows with agreement and with how many models
        // voted; the remainder goes to the empirical estimate, itself
        // discounted when the history is thin.
        let count_term =
            models.total as f64 / (models.total as f64 + self.prediction_saturation);
        let alpha_model = models.agreement * count_term;
        let alpha = alpha_model + (1.0 - alpha_model) * (1.0 - sufficiency);

        let win_probability =
            (alpha * models.probability + (1.0 - alpha) * empirical.win_rate).clamp(0.0, 1.0);

        let confidence = (self.confidence_model_weight * models.avg_confidence * models.agreement
            + (1.0 - self.confidence_model_weight) * sufficiency)
            .clamp(0.0, 1.0);

        let rationale = if empirical.samples < self.min_trades {
            format!(
                "model consensus: {}/{} models {} (avg conf {:.3}); history thin ({} trades)",
                models.agreeing,
                models.total,
                models.direction,
                models.avg_confidence,
                empirical.samples
            )
        } else if alpha >= 0.5 {
            format!(
                "model consensus: {}/{} models {} (avg conf {:.3}), blended over {} trades",
                models.agreeing,
                models.total,
                models.direction,
                models.avg_confidence,
                empirical.samples
            )
        } else {
            format!(
                "historical edge: win rate {:.3} over {} trades, W/L {:.3}, models {:.0}% agreed",
                empirical.win_rate,
                empirical.samples,
                empirical.win_loss_ratio,
                models.agreement * 100.0
            )
        };

        debug!(
            symbol,
            win_probability,
            win_loss_ratio = empirical.win_loss_ratio,
            alpha,
            agreement = models.agreement,
            "probability estimate"
        );

        ProbabilityEstimate {
            win_probability,
            win_loss_ratio: empirical.win_loss_ratio,
            confidence,
            model_agreement: models.agreement,
            direction: models.direction,
            rationale,
        }
    }

    /// Saturating information-sufficiency term: n / (n + min_trades).
    /// More trades raise confidence, but never unboundedly.
    fn history_sufficiency(&self, samples: usize) -> f64 {
        let n = samples as f64;
        n / (n + self.min_trades as f64)
    }

    /// Win rate and payoff ratio with exponential recency weighting:
    /// the i-th newest trade carries weight 0.5^(i / half_life).
    fn weighted_stats(&self, history: &[TradeRecord]) -> WeightedStats {
        if history.is_empty() {
            return WeightedStats {
                win_rate: 0.0,
                win_loss_ratio: 1.0,
                samples: 0,
            };
        }

        let mut total_w = 0.0;
        let mut win_w = 0.0;
        let mut win_pnl_w = 0.0;
        let mut loss_w = 0.0;
        let mut loss_pnl_w = 0.0;

        for (i, trade) in history.iter().enumerate() {
            let w = 0.5f64.powf(i as f64 / self.half_life);
            total_w += w;
            if trade.pnl > 0.0 {
                win_w += w;
                win_pnl_w += w * trade.pnl;
            } else if trade.pnl < 0.0 {
                loss_w += w;
                loss_pnl_w += w * trade.pnl.abs();
            }
        }

        let avg_win = if win_w > 0.0 { win_pnl_w / win_w } else { 0.0 };
        let avg_loss = if loss_w > 0.0 { loss_pnl_w / loss_w } else { 0.0 };
        let win_loss_ratio = if avg_win > 0.0 && avg_loss > 0.0 {
            avg_win / avg_loss
        } else {
            1.0
        };

        WeightedStats {
            win_rate: win_w / total_w,
            win_loss_ratio,
            samples: history.len(),
        }
    }

    /// Majority direction, agreement share, and the confidence-weighted
    /// calibrated probability of the agreeing predictions.
    fn aggregate(&self, predictions: &[&ModelPrediction]) -> Option<ModelConsensus> {
        if predictions.is_empty() {
            return None;
        }

        // Majority by vote count, then by total confidence for ties.
        let mut best = Direction::Flat;
        let mut best_count = 0usize;
        let mut best_conf = -1.0f64;
        for dir in [Direction::Long, Direction::Short, Direction::Flat] {
            let votes: Vec<&&ModelPrediction> =
                predictions.iter().filter(|p| p.direction == dir).collect();
            let conf_sum: f64 = votes.iter().map(|p| p.confidence).sum();
            if votes.len() > best_count || (votes.len() == best_count && conf_sum > best_conf) {
                best = dir;
                best_count = votes.len();
                best_conf = conf_sum;
            }
        }

        let agreeing: Vec<&&ModelPrediction> = predictions
            .iter()
            .filter(|p| p.direction == best)
            .collect();
        let agreement = agreeing.len() as f64 / predictions.len() as f64;
        let avg_confidence =
            predictions.iter().map(|p| p.confidence).sum::<f64>() / predictions.len() as f64;

        // A flat majority carries no directional edge.
        let probability = if best == Direction::Flat {
            0.5
        } else {
            let conf_total: f64 = agreeing.iter().map(|p| p.confidence).sum();
            if conf_total > 0.0 {
                agreeing
                    .iter()
                    .map(|p| p.confidence * calibrate(p.confidence, p.historical_accuracy))
                    .sum::<f64>()
                    / conf_total
            } else {
                agreeing
                    .iter()
                    .map(|p| calibrate(p.confidence, p.historical_accuracy))
                    .sum::<f64>()
                    / agreeing.len() as f64
            }
        };

        Some(ModelConsensus {
            probability,
            agreement,
            avg_confidence,
            direction: best,
            agreeing: agreeing.len(),
            total: predictions.len(),
        })
    }
}

/// Shrink a raw confidence toward 0.5 by the model's historical
/// accuracy: a coin-flip model contributes nothing beyond the prior.
fn calibrate(confidence: f64, accuracy: f64) -> f64 {
    confidence * accuracy + (1.0 - accuracy) * 0.5
}
