//! lbwatch - live health-state synchronization for load-balancer services
//!
//! This crate keeps a local, ordered view of monitored load-balancer
//! services in step with a producer:
//! - Full snapshots and per-service updates over a WebSocket channel
//! - HTTP snapshot fallback whenever the channel drops
//! - Health classification per service and for the whole fleet
//! - A small status API and Prometheus metrics

pub mod api;
pub mod client;
pub mod config;
pub mod health;
pub mod live;
pub mod metrics;
pub mod model;
pub mod state;
pub mod util;

pub use config::Config;
pub use health::{classify, HealthStatus, HealthSummary};
pub use model::{Address, BackendPool, Service, ServiceKey};
pub use state::ServiceStore;
