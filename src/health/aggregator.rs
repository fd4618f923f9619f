//! Health classification of services and backend pools.
//!
//! Classification is a pure function of the address provisioning states.
//! The same logic serves per-pool detail views and per-service dashboards.

use crate::model::{BackendPool, Service};
use serde::Serialize;
use std::fmt;

/// Health status of a service or pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every address succeeded.
    Healthy,
    /// Some, but not all, addresses succeeded.
    Degraded,
    /// No address succeeded.
    Unhealthy,
    /// Nothing to judge: no pools or no addresses.
    Unknown,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 4] = [
        HealthStatus::Healthy,
        HealthStatus::Degraded,
        HealthStatus::Unhealthy,
        HealthStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a service or pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub healthy_count: usize,
    pub total_count: usize,
}

impl HealthSummary {
    /// Share of healthy addresses, rounded to a whole percent.
    pub fn healthy_percent(&self) -> u32 {
        if self.total_count == 0 {
            return 0;
        }
        ((self.healthy_count as f64 / self.total_count as f64) * 100.0).round() as u32
    }
}

/// Classify a service across all of its backend pools.
pub fn classify(service: &Service) -> HealthSummary {
    classify_pools(&service.backend_pools)
}

/// Classify a single backend pool as if it were a one-pool service.
pub fn classify_pool(pool: &BackendPool) -> HealthSummary {
    classify_pools(std::slice::from_ref(pool))
}

fn classify_pools(pools: &[BackendPool]) -> HealthSummary {
    let (healthy_count, total_count) = pools
        .iter()
        .flat_map(|pool| pool.addresses.iter())
        .fold((0, 0), |(healthy, total), addr| {
            (healthy + usize::from(addr.is_healthy()), total + 1)
        });

    let status = if total_count == 0 {
        HealthStatus::Unknown
    } else if healthy_count == total_count {
        HealthStatus::Healthy
    } else if healthy_count > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    };

    HealthSummary {
        status,
        healthy_count,
        total_count,
    }
}

/// Count of services in each status across the fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    /// Every service, including those classified unknown.
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
}

impl FleetSummary {
    /// Number of services with the given status.
    pub fn count(&self, status: HealthStatus) -> usize {
        match status {
            HealthStatus::Healthy => self.healthy,
            HealthStatus::Degraded => self.degraded,
            HealthStatus::Unhealthy => self.unhealthy,
            HealthStatus::Unknown => self.unknown,
        }
    }
}

/// Summarize a set of services in one pass.
pub fn fleet_summary<'a, I>(services: I) -> FleetSummary
where
    I: IntoIterator<Item = &'a Service>,
{
    services
        .into_iter()
        .fold(FleetSummary::default(), |mut summary, service| {
            summary.total += 1;
            match classify(service).status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Unhealthy => summary.unhealthy += 1,
                HealthStatus::Unknown => summary.unknown += 1,
            }
            summary
        })
}
