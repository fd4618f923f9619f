//! Metrics collection.

mod collector;

pub use collector::{FetchTrigger, MetricsCollector};
