//! Persistence adapters - JSONL trade-history access.

pub mod history;

pub use history::JsonlHistoryStore;
