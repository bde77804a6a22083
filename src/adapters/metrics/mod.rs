//! Metrics adapters - health endpoints and Prometheus registry.

pub mod health;
pub mod prometheus;

pub use health::HealthServer;
pub use prometheus::EngineMetrics;
