//! Adapters layer - concrete implementations of the ports.
//!
//! - `persistence`: JSONL trade-history reader
//! - `http`: reqwest-based prediction and market-data clients
//! - `metrics`: axum health server and Prometheus registry

pub mod http;
pub mod metrics;
pub mod persistence;
