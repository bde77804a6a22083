//! Kelly Sizing Service - On-demand Position Recommendations
//!
//! Orchestrates the full pipeline per call: load trade history, fetch
//! model predictions, estimate the win probability, size the position,
//! and record the outcome. Collaborators are injected at construction
//! time as trait objects - there are no process-wide singletons.
//!
//! Concurrency: the Kelly arithmetic is synchronous; the only await
//! points are the three ports. Metrics and the recent-recommendations
//! buffer are updated as a single locked step per completed call, so
//! concurrent completions never lose updates. The buffer records
//! completion order, which may differ from request order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::adapters::metrics::prometheus::EngineMetrics;
use crate::config::{AppConfig, HistoryConfig, SymbolConfig};
use crate::domain::estimator::ProbabilityEstimator;
use crate::domain::kelly::{KellyCalculator, KellyError};
use crate::domain::record::{KellyRecommendation, TradeRecord};
use crate::ports::market_data::{MarketData, MarketSnapshot};
use crate::ports::predictions::PredictionSource;
use crate::ports::trade_history::{HistoryFilter, TradeHistory};

/// Service lifecycle states.
///
/// `Degraded` is entered after repeated internal failures and left on
/// the next successful call; recommendations are still served in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Degraded,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// Errors surfaced to callers of the sizing service.
#[derive(Debug, Error)]
pub enum SizingError {
    /// The service is not accepting calls in its current state.
    #[error("sizing service not running (state: {0})")]
    NotRunning(ServiceState),
    /// `start()` was called while the service was not stopped.
    #[error("sizing service already started (state: {0})")]
    AlreadyStarted(ServiceState),
    /// The sizing formula violated an internal invariant. Fatal for
    /// this call only; the service keeps running.
    #[error(transparent)]
    Kelly(#[from] KellyError),
}

/// One sizing request. `trade_history` and `market_snapshot` override
/// the respective collaborators when supplied (e.g. by test harnesses
/// or backtests); otherwise the service queries its ports.
#[derive(Debug, Clone, Default)]
pub struct SizingRequest {
    /// Instrument to size.
    pub symbol: String,
    /// Account capital; falls back to the configured default.
    pub account_capital: Option<f64>,
    /// Pre-loaded trade history, newest-first.
    pub trade_history: Option<Vec<TradeRecord>>,
    /// Pre-fetched market snapshot.
    pub market_snapshot: Option<MarketSnapshot>,
    /// Risk fraction already committed across the portfolio.
    pub current_portfolio_risk: f64,
}

impl SizingRequest {
    /// Request with defaults for everything but the symbol.
    pub fn for_symbol(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Self::default()
        }
    }
}

/// Snapshot of service health for readiness probes and dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Current lifecycle state.
    pub status: ServiceState,
    /// Seconds since `start()`, 0 when stopped.
    pub uptime_seconds: u64,
    /// Collaborator and internal failures since start.
    pub error_count: u64,
    /// Most recent error message, if any.
    pub last_error: Option<String>,
}

/// Aggregate performance counters since service start.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    /// Completed recommendation calls.
    pub total_recommendations: u64,
    /// Calls that produced an actionable (accepted/capped) size.
    pub successful_recommendations: u64,
    /// Mean confidence across completed calls.
    pub average_confidence: f64,
    /// Seconds since `start()`.
    pub service_uptime_seconds: u64,
}

/// Mutable aggregate guarded by a single lock: counter updates and
/// buffer insertion happen as one atomic step per completed call.
struct ServiceStats {
    total: u64,
    successful: u64,
    confidence_sum: f64,
    recent: VecDeque<KellyRecommendation>,
}

/// On-demand Kelly position sizing service.
pub struct KellySizingService {
    history: Arc<dyn TradeHistory>,
    predictions: Arc<dyn PredictionSource>,
    market_data: Arc<dyn MarketData>,
    estimator: ProbabilityEstimator,
    calculator: KellyCalculator,
    symbols: Vec<SymbolConfig>,
    history_config: HistoryConfig,
    default_capital: f64,
    recent_capacity: usize,
    degraded_after: u32,
    metrics: Option<Arc<EngineMetrics>>,
    state: Mutex<ServiceState>,
    started_at: Mutex<Option<Instant>>,
    stats: Mutex<ServiceStats>,
    error_count: AtomicU64,
    consecutive_failures: AtomicU32,
    last_error: Mutex<Option<String>>,
}

/// Poisoning cannot corrupt these aggregates (every update is a full
/// assignment), so a poisoned lock just keeps serving.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl KellySizingService {
    /// Build a service from config and injected collaborators.
    pub fn new(
        config: &AppConfig,
        history: Arc<dyn TradeHistory>,
        predictions: Arc<dyn PredictionSource>,
        market_data: Arc<dyn MarketData>,
    ) -> Self {
        Self {
            history,
            predictions,
            market_data,
            estimator: ProbabilityEstimator::new(&config.estimator),
            calculator: KellyCalculator::new(&config.kelly),
            symbols: config.symbols.clone(),
            history_config: config.history.clone(),
            default_capital: config.engine.default_account_capital,
            recent_capacity: config.service.recent_buffer_size,
            degraded_after: config.service.degraded_after_failures,
            metrics: None,
            state: Mutex::new(ServiceState::Stopped),
            started_at: Mutex::new(None),
            stats: Mutex::new(ServiceStats {
                total: 0,
                successful: 0,
                confidence_sum: 0.0,
                recent: VecDeque::new(),
            }),
            error_count: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Attach a Prometheus metrics registry.
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start the service: probe collaborators and reset counters.
    ///
    /// Collaborator unavailability is logged, not fatal - the service
    /// starts anyway and degrades those calls to insufficient-data.
    pub async fn start(&self) -> Result<(), SizingError> {
        {
            let mut state = lock(&self.state);
            if *state != ServiceState::Stopped {
                return Err(SizingError::AlreadyStarted(*state));
            }
            *state = ServiceState::Starting;
        }
        info!("Starting Kelly sizing service");

        if !self.history.is_available().await {
            warn!("trade-history store unavailable at startup");
        }
        if !self.predictions.is_healthy().await {
            warn!("prediction source unavailable at startup");
        }
        if !self.market_data.is_healthy().await {
            warn!("market-data source unavailable at startup");
        }

        {
            let mut stats = lock(&self.stats);
            stats.total = 0;
            stats.successful = 0;
            stats.confidence_sum = 0.0;
            stats.recent.clear();
        }
        self.error_count.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *lock(&self.last_error) = None;
        *lock(&self.started_at) = Some(Instant::now());
        *lock(&self.state) = ServiceState::Running;

        info!("Kelly sizing service started");
        Ok(())
    }

    /// Stop the service. In-flight calls complete and their metric
    /// updates still apply; no further calls are accepted afterwards.
    pub async fn stop(&self) {
        {
            let mut state = lock(&self.state);
            if !matches!(*state, ServiceState::Running | ServiceState::Degraded) {
                return;
            }
            *state = ServiceState::Stopping;
        }
        info!("Stopping Kelly sizing service");
        *lock(&self.started_at) = None;
        *lock(&self.state) = ServiceState::Stopped;
        info!("Kelly sizing service stopped");
    }

    /// Produce a position recommendation for one symbol.
    #[instrument(skip(self, request), fields(symbol = %request.symbol))]
    pub async fn recommend(
        &self,
        request: SizingRequest,
    ) -> Result<KellyRecommendation, SizingError> {
        {
            let state = lock(&self.state);
            if !matches!(*state, ServiceState::Running | ServiceState::Degraded) {
                return Err(SizingError::NotRunning(*state));
            }
        }

        let symbol = request.symbol.clone();
        let capital = request.account_capital.unwrap_or(self.default_capital);

        let history = match request.trade_history {
            Some(h) => h,
            None => self.load_history(&symbol).await,
        };
        let history: Vec<TradeRecord> = history
            .into_iter()
            .filter(|r| match r.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "dropping malformed trade record");
                    false
                }
            })
            .collect();

        let predictions = match self.predictions.predictions(&symbol).await {
            Ok(p) => p,
            Err(e) => {
                self.record_collaborator_error("prediction source", &e);
                Vec::new()
            }
        };

        let estimate = self.estimator.estimate(&predictions, &history, &symbol);

        let snapshot = match request.market_snapshot {
            Some(s) => Some(s),
            None => match self.market_data.snapshot(&symbol).await {
                Ok(s) => s,
                Err(e) => {
                    self.record_collaborator_error("market data", &e);
                    None
                }
            },
        };
        let contract_value = self.contract_value(&symbol, snapshot.as_ref());

        match self.calculator.recommend(
            &symbol,
            &estimate,
            capital,
            contract_value,
            request.current_portfolio_risk,
        ) {
            Ok(recommendation) => {
                self.record_completion(&recommendation);
                info!(
                    symbol = %symbol,
                    status = recommendation.status.label(),
                    kelly_fraction = recommendation.kelly_fraction,
                    position_size = recommendation.position_size,
                    "recommendation produced"
                );
                Ok(recommendation)
            }
            Err(e) => {
                self.record_internal_failure(&e);
                Err(e.into())
            }
        }
    }

    /// Current health snapshot. Always reflects the latest state.
    pub fn health(&self) -> ServiceHealth {
        ServiceHealth {
            status: *lock(&self.state),
            uptime_seconds: self.uptime_seconds(),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_error: lock(&self.last_error).clone(),
        }
    }

    /// Aggregate performance counters since start.
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let stats = lock(&self.stats);
        let average_confidence = if stats.total > 0 {
            stats.confidence_sum / stats.total as f64
        } else {
            0.0
        };
        PerformanceMetrics {
            total_recommendations: stats.total,
            successful_recommendations: stats.successful,
            average_confidence,
            service_uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Most recent recommendations, newest first, bounded by the ring
    /// buffer capacity.
    pub fn recent_recommendations(&self, limit: usize) -> Vec<KellyRecommendation> {
        let stats = lock(&self.stats);
        stats.recent.iter().rev().take(limit).cloned().collect()
    }

    fn uptime_seconds(&self) -> u64 {
        lock(&self.started_at)
            .as_ref()
            .map_or(0, |t| t.elapsed().as_secs())
    }

    async fn load_history(&self, symbol: &str) -> Vec<TradeRecord> {
        let filter = HistoryFilter::for_symbol(
            symbol,
            self.history_config.lookback_days,
            self.history_config.load_limit,
        );
        match self.history.load(filter).await {
            Ok(records) => records,
            Err(e) => {
                self.record_collaborator_error("trade history", &e);
                Vec::new()
            }
        }
    }

    /// Capital consumed per contract, from symbol config and the
    /// current price. Unknown symbols stay unpriced.
    fn contract_value(&self, symbol: &str, snapshot: Option<&MarketSnapshot>) -> Option<f64> {
        let Some(spec) = self.symbols.iter().find(|s| s.symbol == symbol) else {
            warn!(symbol, "no contract spec configured, sizing fraction-only");
            return None;
        };
        spec.contract_value(snapshot.map(|s| s.price))
    }

    /// Single atomic stats step per completed call.
    fn record_completion(&self, recommendation: &KellyRecommendation) {
        {
            let mut stats = lock(&self.stats);
            stats.total += 1;
            if recommendation.status.is_actionable() {
                stats.successful += 1;
            }
            stats.confidence_sum += recommendation.confidence;
            stats.recent.push_back(recommendation.clone());
            // Eviction is the only deletion path.
            while stats.recent.len() > self.recent_capacity {
                stats.recent.pop_front();
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_recommendation(recommendation);
        }

        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut state = lock(&self.state);
        if *state == ServiceState::Degraded {
            info!("service recovered after successful call");
            *state = ServiceState::Running;
        }
    }

    fn record_collaborator_error(&self, collaborator: &str, error: &anyhow::Error) {
        warn!(collaborator, error = %error, "collaborator unavailable, degrading to insufficient data");
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_error) = Some(format!("{collaborator}: {error}"));
        if let Some(metrics) = &self.metrics {
            metrics.collaborator_errors.inc();
        }
    }

    fn record_internal_failure(&self, error: &KellyError) {
        warn!(error = %error, "internal sizing failure");
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_error) = Some(error.to_string());
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.degraded_after {
            let mut state = lock(&self.state);
            if *state == ServiceState::Running {
                warn!(failures, "repeated internal failures, marking service degraded");
                *state = ServiceState::Degraded;
            }
        }
    }
}
