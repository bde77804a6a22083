//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`. Every tuning
//! knob of the estimation/sizing pipeline lives here - the blending and
//! clamping shape is the contract, the coefficients are configuration.

pub mod loader;

use serde::Deserialize;

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the service starts.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Engine identity and runtime behavior.
    pub engine: EngineConfig,
    /// Instrument definitions and contract specs.
    pub symbols: Vec<SymbolConfig>,
    /// Trade-history store access.
    pub history: HistoryConfig,
    /// Probability-estimator coefficients.
    #[serde(default)]
    pub estimator: EstimatorConfig,
    /// Kelly sizing and risk limits.
    #[serde(default)]
    pub kelly: KellyConfig,
    /// Sizing-service behavior.
    #[serde(default)]
    pub service: ServiceConfig,
    /// External collaborator endpoints.
    pub collaborators: CollaboratorConfig,
    /// Metrics and health endpoints.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Engine identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Human-readable engine name.
    pub name: String,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Interval between scheduled re-evaluations (seconds).
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_seconds: u64,
    /// Account capital used when the caller does not supply one.
    #[serde(default = "default_account_capital")]
    pub default_account_capital: f64,
}

/// Per-instrument contract specification.
///
/// The margin/notional per contract is what converts a risk fraction
/// into a whole-contract position; it is never hardcoded.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    /// Instrument symbol (e.g. "NQU25").
    pub symbol: String,
    /// Dollar value per point of price movement.
    pub point_multiplier: f64,
    /// Fixed margin per contract. When absent, contract value is
    /// derived as price x point_multiplier from live market data.
    pub margin_per_contract: Option<f64>,
    /// Whether this instrument is evaluated by the periodic loop.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl SymbolConfig {
    /// Capital consumed per contract, given the current price when one
    /// is available. `None` means sizing must stay fraction-only.
    pub fn contract_value(&self, price: Option<f64>) -> Option<f64> {
        self.margin_per_contract
            .or_else(|| price.map(|p| p * self.point_multiplier))
            .filter(|v| v.is_finite() && *v > 0.0)
    }
}

/// Trade-history store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Directory holding the execution layer's JSONL trade logs.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Days of history considered per sizing call.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Maximum records loaded per sizing call.
    #[serde(default = "default_load_limit")]
    pub load_limit: usize,
}

/// Probability-estimator coefficients.
#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    /// Half-life of the recency weighting, in trades.
    #[serde(default = "default_half_life")]
    pub recency_half_life_trades: f64,
    /// History size treated as "enough" (sufficiency midpoint).
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,
    /// Prediction count at which model trust saturates halfway.
    #[serde(default = "default_prediction_saturation")]
    pub prediction_saturation: f64,
    /// Weight of the model term in the confidence mix.
    #[serde(default = "default_confidence_model_weight")]
    pub confidence_model_weight: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            recency_half_life_trades: default_half_life(),
            min_trades: default_min_trades(),
            prediction_saturation: default_prediction_saturation(),
            confidence_model_weight: default_confidence_model_weight(),
        }
    }
}

/// Kelly sizing and risk-limit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.5 = half-Kelly).
    #[serde(default = "default_fraction_multiplier")]
    pub fraction_multiplier: f64,
    /// Hard ceiling on capital at risk per position (0.02 = 2%).
    #[serde(default = "default_max_risk_fraction")]
    pub max_risk_fraction: f64,
    /// Fractions below this are rejected as not worth trading.
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f64,
    /// Maximum contracts per position.
    #[serde(default = "default_max_contracts")]
    pub max_contracts: u32,
    /// Confidence at which no extra shrinkage applies.
    #[serde(default = "default_full_confidence")]
    pub full_confidence: f64,
    /// Total portfolio risk budget across open positions.
    #[serde(default = "default_max_portfolio_risk")]
    pub max_portfolio_risk: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            fraction_multiplier: default_fraction_multiplier(),
            max_risk_fraction: default_max_risk_fraction(),
            min_fraction: default_min_fraction(),
            max_contracts: default_max_contracts(),
            full_confidence: default_full_confidence(),
            max_portfolio_risk: default_max_portfolio_risk(),
        }
    }
}

/// Sizing-service behavior configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Capacity of the recent-recommendations ring buffer.
    #[serde(default = "default_recent_buffer_size")]
    pub recent_buffer_size: usize,
    /// Consecutive internal failures before the service degrades.
    #[serde(default = "default_degraded_after_failures")]
    pub degraded_after_failures: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            recent_buffer_size: default_recent_buffer_size(),
            degraded_after_failures: default_degraded_after_failures(),
        }
    }
}

/// External collaborator endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    /// ML prediction service base URL.
    pub prediction_url: String,
    /// Market-data service base URL.
    pub market_data_url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Metrics server bind address.
    #[serde(default = "default_metrics_addr")]
    pub bind_address: String,
    /// Health check endpoint port.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_metrics_addr(),
            health_port: default_health_port(),
        }
    }
}

// Default value functions for serde

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_evaluation_interval() -> u64 {
    60
}

fn default_account_capital() -> f64 {
    100_000.0
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_lookback_days() -> u32 {
    30
}

fn default_load_limit() -> usize {
    50
}

fn default_half_life() -> f64 {
    10.0
}

fn default_min_trades() -> usize {
    10
}

fn default_prediction_saturation() -> f64 {
    2.0
}

fn default_confidence_model_weight() -> f64 {
    0.6
}

fn default_fraction_multiplier() -> f64 {
    0.5
}

fn default_max_risk_fraction() -> f64 {
    0.02
}

fn default_min_fraction() -> f64 {
    0.005
}

fn default_max_contracts() -> u32 {
    5
}

fn default_full_confidence() -> f64 {
    0.8
}

fn default_max_portfolio_risk() -> f64 {
    0.20
}

fn default_recent_buffer_size() -> usize {
    256
}

fn default_degraded_after_failures() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
    8080
}
