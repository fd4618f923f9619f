//! Health classification for monitored services.

mod aggregator;

pub use aggregator::{
    classify, classify_pool, fleet_summary, FleetSummary, HealthStatus, HealthSummary,
};
