//! Integration Tests - End-to-end Sizing Service Testing
//!
//! Tests the interaction between the sizing service, ports, and mock
//! adapters. Uses mockall for trait mocking and tokio::test for async
//! tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;

use kelly_sizing_engine::config::AppConfig;
use kelly_sizing_engine::domain::record::{
    Direction, ModelPrediction, RecommendationStatus, TradeRecord, TradeSide,
};
use kelly_sizing_engine::ports::market_data::{MarketData, MarketSnapshot};
use kelly_sizing_engine::ports::predictions::PredictionSource;
use kelly_sizing_engine::ports::trade_history::{HistoryFilter, TradeHistory};
use kelly_sizing_engine::usecases::sizing_service::{
    KellySizingService, ServiceState, SizingError, SizingRequest,
};

// ---- Mock Definitions ----

mock! {
    pub History {}

    #[async_trait]
    impl TradeHistory for History {
        async fn load(&self, filter: HistoryFilter) -> anyhow::Result<Vec<TradeRecord>>;
        async fn is_available(&self) -> bool;
    }
}

mock! {
    pub Predictions {}

    #[async_trait]
    impl PredictionSource for Predictions {
        async fn predictions(&self, symbol: &str) -> anyhow::Result<Vec<ModelPrediction>>;
        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub Market {}

    #[async_trait]
    impl MarketData for Market {
        async fn snapshot(&self, symbol: &str) -> anyhow::Result<Option<MarketSnapshot>>;
        async fn is_healthy(&self) -> bool;
    }
}

// ---- Fixtures ----

fn trade(pnl: f64) -> TradeRecord {
    TradeRecord {
        symbol: "NQU25".to_string(),
        timestamp: Utc::now(),
        entry_price: 23_000.0,
        exit_price: 23_000.0 + pnl / 20.0,
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

fn scenario_history() -> Vec<TradeRecord> {
    vec![trade(150.0), trade(-100.0), trade(200.0), trade(-120.0)]
}

fn scenario_predictions() -> Vec<ModelPrediction> {
    vec![
        ModelPrediction {
            model_id: "lstm".to_string(),
            confidence: 0.75,
            direction: Direction::Long,
            historical_accuracy: 0.65,
        },
        ModelPrediction {
            model_id: "ensemble".to_string(),
            confidence: 0.70,
            direction: Direction::Long,
            historical_accuracy: 0.70,
        },
    ]
}

fn snapshot(price: f64) -> MarketSnapshot {
    MarketSnapshot {
        symbol: "NQU25".to_string(),
        price,
        volume: Some(12_000.0),
        timestamp: Utc::now(),
    }
}

fn test_config() -> AppConfig {
    let toml = r#"
        [engine]
        name = "kelly-sizing-engine"
        default_account_capital = 100000.0

        [[symbols]]
        symbol = "NQU25"
        point_multiplier = 20.0
        margin_per_contract = 17500.0

        [history]
        data_dir = "data"

        [collaborators]
        prediction_url = "http://localhost:8500"
        market_data_url = "http://localhost:8600"
    "#;
    toml::from_str(toml).unwrap()
}

fn healthy_service(
    history: Vec<TradeRecord>,
    predictions: Vec<ModelPrediction>,
    price: Option<f64>,
) -> KellySizingService {
    let mut mock_history = MockHistory::new();
    mock_history
        .expect_load()
        .returning(move |_| Ok(history.clone()));
    mock_history.expect_is_available().returning(|| true);

    let mut mock_predictions = MockPredictions::new();
    mock_predictions
        .expect_predictions()
        .returning(move |_| Ok(predictions.clone()));
    mock_predictions.expect_is_healthy().returning(|| true);

    let mut mock_market = MockMarket::new();
    mock_market.expect_snapshot().returning(move |symbol| {
        Ok(price.map(|p| MarketSnapshot {
            symbol: symbol.to_string(),
            price: p,
            volume: Some(12_000.0),
            timestamp: Utc::now(),
        }))
    });
    mock_market.expect_is_healthy().returning(|| true);

    KellySizingService::new(
        &test_config(),
        Arc::new(mock_history),
        Arc::new(mock_predictions),
        Arc::new(mock_market),
    )
}

// ---- Integration Tests ----

/// The literal end-to-end scenario: 4 trades, two agreeing long
/// models, 100k capital.
#[tokio::test]
async fn test_end_to_end_scenario() {
    let service = healthy_service(
        scenario_history(),
        scenario_predictions(),
        Some(23_000.0),
    );
    service.start().await.unwrap();

    let mut request = SizingRequest::for_symbol("NQU25");
    request.account_capital = Some(100_000.0);
    let rec = service.recommend(request).await.unwrap();

    assert_eq!(rec.symbol, "NQU25");
    assert!(rec.model_agreement > 0.99, "both models agree long");
    assert!(rec.confidence > 0.0);
    assert!(rec.capital_risk_fraction <= 0.02 + 1e-12);
    assert!(matches!(
        rec.status,
        RecommendationStatus::Accepted
            | RecommendationStatus::Capped
            | RecommendationStatus::Rejected(_)
    ));

    let metrics = service.performance_metrics();
    assert_eq!(metrics.total_recommendations, 1);
    assert!(metrics.average_confidence > 0.0);
}

/// Trade-history store failure degrades to insufficient data; the call
/// still completes and the error is counted in health.
#[tokio::test]
async fn test_history_failure_degrades_gracefully() {
    let mut mock_history = MockHistory::new();
    mock_history
        .expect_load()
        .returning(|_| Err(anyhow::anyhow!("store unreachable")));
    mock_history.expect_is_available().returning(|| false);

    let mut mock_predictions = MockPredictions::new();
    let preds = scenario_predictions();
    mock_predictions
        .expect_predictions()
        .returning(move |_| Ok(preds.clone()));
    mock_predictions.expect_is_healthy().returning(|| true);

    let mut mock_market = MockMarket::new();
    mock_market
        .expect_snapshot()
        .returning(|_| Ok(Some(snapshot(23_000.0))));
    mock_market.expect_is_healthy().returning(|| true);

    let service = KellySizingService::new(
        &test_config(),
        Arc::new(mock_history),
        Arc::new(mock_predictions),
        Arc::new(mock_market),
    );
    service.start().await.unwrap();

    let rec = service
        .recommend(SizingRequest::for_symbol("NQU25"))
        .await
        .unwrap();
    // Model-only estimate still produces a recommendation.
    assert!(rec.model_agreement > 0.99);

    let health = service.health();
    assert!(health.error_count >= 1);
    assert!(health.last_error.is_some());
    assert_eq!(health.status, ServiceState::Running);
}

/// All collaborators down: the call completes as a neutral rejection,
/// never an error.
#[tokio::test]
async fn test_all_collaborators_down_yields_rejection() {
    let mut mock_history = MockHistory::new();
    mock_history
        .expect_load()
        .returning(|_| Err(anyhow::anyhow!("store down")));
    mock_history.expect_is_available().returning(|| false);

    let mut mock_predictions = MockPredictions::new();
    mock_predictions
        .expect_predictions()
        .returning(|_| Err(anyhow::anyhow!("ml service down")));
    mock_predictions.expect_is_healthy().returning(|| false);

    let mut mock_market = MockMarket::new();
    mock_market
        .expect_snapshot()
        .returning(|_| Err(anyhow::anyhow!("feed down")));
    mock_market.expect_is_healthy().returning(|| false);

    let service = KellySizingService::new(
        &test_config(),
        Arc::new(mock_history),
        Arc::new(mock_predictions),
        Arc::new(mock_market),
    );
    service.start().await.unwrap();

    let rec = service
        .recommend(SizingRequest::for_symbol("NQU25"))
        .await
        .unwrap();
    // Neutral estimate (p = 0.5, no edge) must be rejected with zero size.
    assert_eq!(
        rec.status,
        RecommendationStatus::Rejected(
            kelly_sizing_engine::domain::record::RejectReason::NoEdge
        )
    );
    assert_eq!(rec.position_size, 0);
    assert!(service.health().error_count >= 3);
}

/// N concurrent calls against one instance count exactly N.
#[tokio::test]
async fn test_concurrent_calls_no_lost_updates() {
    let service = Arc::new(healthy_service(
        scenario_history(),
        scenario_predictions(),
        Some(23_000.0),
    ));
    service.start().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..64 {
        let svc = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            svc.recommend(SizingRequest::for_symbol("NQU25")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(service.performance_metrics().total_recommendations, 64);
    assert_eq!(service.recent_recommendations(100).len(), 64);
}

/// An in-flight call completes after stop() and its metrics update
/// still applies; later calls are refused.
#[tokio::test]
async fn test_stop_lets_in_flight_call_complete() {
    struct SlowHistory;

    #[async_trait]
    impl TradeHistory for SlowHistory {
        async fn load(&self, _filter: HistoryFilter) -> anyhow::Result<Vec<TradeRecord>> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(scenario_history())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    let mut mock_predictions = MockPredictions::new();
    let preds = scenario_predictions();
    mock_predictions
        .expect_predictions()
        .returning(move |_| Ok(preds.clone()));
    mock_predictions.expect_is_healthy().returning(|| true);

    let mut mock_market = MockMarket::new();
    mock_market
        .expect_snapshot()
        .returning(|_| Ok(Some(snapshot(23_000.0))));
    mock_market.expect_is_healthy().returning(|| true);

    let service = Arc::new(KellySizingService::new(
        &test_config(),
        Arc::new(SlowHistory),
        Arc::new(mock_predictions),
        Arc::new(mock_market),
    ));
    service.start().await.unwrap();

    let svc = Arc::clone(&service);
    let in_flight =
        tokio::spawn(async move { svc.recommend(SizingRequest::for_symbol("NQU25")).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    service.stop().await;
    assert_eq!(service.health().status, ServiceState::Stopped);

    // The in-flight call still completes and is counted.
    in_flight.await.unwrap().unwrap();
    assert_eq!(service.performance_metrics().total_recommendations, 1);

    // No further calls accepted.
    let err = service
        .recommend(SizingRequest::for_symbol("NQU25"))
        .await
        .unwrap_err();
    assert!(matches!(err, SizingError::NotRunning(_)));
}

/// Supplied trade history and market snapshot bypass the collaborators.
#[tokio::test]
async fn test_supplied_inputs_bypass_ports() {
    let mut mock_history = MockHistory::new();
    mock_history.expect_load().times(0);
    mock_history.expect_is_available().returning(|| true);

    let mut mock_predictions = MockPredictions::new();
    let preds = scenario_predictions();
    mock_predictions
        .expect_predictions()
        .returning(move |_| Ok(preds.clone()));
    mock_predictions.expect_is_healthy().returning(|| true);

    let mut mock_market = MockMarket::new();
    mock_market.expect_snapshot().times(0);
    mock_market.expect_is_healthy().returning(|| true);

    let service = KellySizingService::new(
        &test_config(),
        Arc::new(mock_history),
        Arc::new(mock_predictions),
        Arc::new(mock_market),
    );
    service.start().await.unwrap();

    let mut request = SizingRequest::for_symbol("NQU25");
    request.trade_history = Some(scenario_history());
    request.market_snapshot = Some(snapshot(23_000.0));
    request.account_capital = Some(1_000_000.0);

    let rec = service.recommend(request).await.unwrap();
    assert!(rec.status.is_actionable());
    assert!(rec.position_size >= 1);
}

/// The trait's provided statistics/verify_sufficient methods work over
/// a mocked load.
#[tokio::test]
async fn test_history_trait_provided_methods() {
    let mut mock_history = MockHistory::new();
    mock_history
        .expect_load()
        .returning(|_| Ok(scenario_history()));
    mock_history.expect_is_available().returning(|| true);

    let stats = mock_history.statistics(Some("NQU25")).await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.wins, 2);
    assert!((stats.win_rate - 0.5).abs() < 1e-12);

    assert!(mock_history.verify_sufficient(4).await);
    assert!(!mock_history.verify_sufficient(5).await);
}
