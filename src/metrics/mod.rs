//! Metrics Module
//!
//! Relay counters and their Prometheus export.

pub mod collector;

pub use collector::{MetricsSnapshot, RelayMetrics};
