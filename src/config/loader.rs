//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
    let path = Path::new(path);

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: AppConfig =
        toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;

    validate_config(&config)?;

    info!(
        symbols = config.symbols.len(),
        kelly_multiplier = config.kelly.fraction_multiplier,
        max_risk = config.kelly.max_risk_fraction,
        half_life = config.estimator.recency_half_life_trades,
        "Configuration loaded successfully"
    );

    Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Positive numeric values where required
/// - Valid fraction ranges (0..1)
/// - Sensible risk limits
/// - Non-empty symbol definitions
fn validate_config(config: &AppConfig) -> Result<()> {
    // Symbol validation
    anyhow::ensure!(
        !config.symbols.is_empty(),
        "At least one symbol must be configured"
    );

    for (i, sym) in config.symbols.iter().enumerate() {
        anyhow::ensure!(
            !sym.symbol.is_empty(),
            "Symbol {} has an empty symbol name",
            i
        );
        anyhow::ensure!(
            sym.point_multiplier > 0.0,
            "Symbol {} ({}) must have a positive point_multiplier, got {}",
            i,
            sym.symbol,
            sym.point_multiplier
        );
        if let Some(margin) = sym.margin_per_contract {
            anyhow::ensure!(
                margin > 0.0,
                "Symbol {} ({}) margin_per_contract must be positive, got {}",
                i,
                sym.symbol,
                margin
            );
        }
    }

    // Engine validation
    anyhow::ensure!(
        config.engine.default_account_capital > 0.0,
        "default_account_capital must be positive, got {}",
        config.engine.default_account_capital
    );
    anyhow::ensure!(
        config.engine.evaluation_interval_seconds > 0,
        "evaluation_interval_seconds must be positive"
    );

    // Estimator validation
    anyhow::ensure!(
        config.estimator.recency_half_life_trades > 0.0,
        "recency_half_life_trades must be positive, got {}",
        config.estimator.recency_half_life_trades
    );
    anyhow::ensure!(
        config.estimator.min_trades > 0,
        "estimator min_trades must be positive"
    );
    anyhow::ensure!(
        config.estimator.prediction_saturation > 0.0,
        "prediction_saturation must be positive"
    );
    anyhow::ensure!(
        (0.0..=1.0).contains(&config.estimator.confidence_model_weight),
        "confidence_model_weight must be in [0, 1], got {}",
        config.estimator.confidence_model_weight
    );

    // Kelly validation
    anyhow::ensure!(
        config.kelly.fraction_multiplier > 0.0 && config.kelly.fraction_multiplier <= 1.0,
        "Kelly fraction_multiplier must be in (0, 1], got {}",
        config.kelly.fraction_multiplier
    );
    anyhow::ensure!(
        config.kelly.max_risk_fraction > 0.0 && config.kelly.max_risk_fraction <= 1.0,
        "max_risk_fraction must be in (0, 1], got {}",
        config.kelly.max_risk_fraction
    );
    anyhow::ensure!(
        config.kelly.min_fraction >= 0.0 && config.kelly.min_fraction < config.kelly.max_risk_fraction,
        "min_fraction must be in [0, max_risk_fraction), got {}",
        config.kelly.min_fraction
    );
    anyhow::ensure!(
        config.kelly.max_contracts > 0,
        "max_contracts must be positive"
    );
    anyhow::ensure!(
        config.kelly.full_confidence > 0.0 && config.kelly.full_confidence <= 1.0,
        "full_confidence must be in (0, 1], got {}",
        config.kelly.full_confidence
    );
    anyhow::ensure!(
        config.kelly.max_portfolio_risk >= config.kelly.max_risk_fraction
            && config.kelly.max_portfolio_risk <= 1.0,
        "max_portfolio_risk must be in [max_risk_fraction, 1], got {}",
        config.kelly.max_portfolio_risk
    );

    // History validation
    anyhow::ensure!(
        !config.history.data_dir.is_empty(),
        "history data_dir must not be empty"
    );
    anyhow::ensure!(
        config.history.lookback_days > 0,
        "history lookback_days must be positive"
    );
    anyhow::ensure!(
        config.history.load_limit > 0,
        "history load_limit must be positive"
    );

    // Service validation
    anyhow::ensure!(
        config.service.recent_buffer_size > 0,
        "recent_buffer_size must be positive"
    );
    anyhow::ensure!(
        config.service.degraded_after_failures > 0,
        "degraded_after_failures must be positive"
    );

    // Collaborator validation
    anyhow::ensure!(
        !config.collaborators.prediction_url.is_empty(),
        "prediction_url must not be empty"
    );
    anyhow::ensure!(
        !config.collaborators.market_data_url.is_empty(),
        "market_data_url must not be empty"
    );
    anyhow::ensure!(
        config.collaborators.timeout_ms > 0,
        "collaborator timeout_ms must be positive"
    );

    Ok(())
}
