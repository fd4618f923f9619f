//! Metrics collector using prometheus-client.
//!
//! Provides metrics for fleet health, channel connectivity, processed events
//! and snapshot fetches.

use crate::health::{FleetSummary, HealthStatus};
use crate::live::{ConnectionStatus, EventKind};
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels for the services-by-status gauge.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub status: ServiceStatus,
}

/// Health status as a label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl From<HealthStatus> for ServiceStatus {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => ServiceStatus::Healthy,
            HealthStatus::Degraded => ServiceStatus::Degraded,
            HealthStatus::Unhealthy => ServiceStatus::Unhealthy,
            HealthStatus::Unknown => ServiceStatus::Unknown,
        }
    }
}

/// Labels for the connection state gauge.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ConnectionLabels {
    pub state: LinkStateLabel,
}

/// Connection status as a label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum LinkStateLabel {
    Disconnected,
    Connecting,
    Connected,
}

impl From<ConnectionStatus> for LinkStateLabel {
    fn from(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Disconnected => LinkStateLabel::Disconnected,
            ConnectionStatus::Connecting => LinkStateLabel::Connecting,
            ConnectionStatus::Connected => LinkStateLabel::Connected,
        }
    }
}

/// Labels for processed event counts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub kind: EventKindLabel,
}

/// Event kind as a label value.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum EventKindLabel {
    InitialData,
    HealthUpdate,
    Unrecognized,
    Malformed,
}

impl From<EventKind> for EventKindLabel {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::InitialData => EventKindLabel::InitialData,
            EventKind::HealthUpdate => EventKindLabel::HealthUpdate,
            EventKind::Unrecognized => EventKindLabel::Unrecognized,
        }
    }
}

/// Labels for snapshot fetch metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FetchLabels {
    pub trigger: FetchTrigger,
    pub result: FetchResult,
}

/// Why a snapshot was fetched.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum FetchTrigger {
    /// Channel went down.
    Fallback,
    /// Explicit refresh request.
    Refresh,
}

/// Outcome of a snapshot fetch.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum FetchResult {
    Success,
    Failure,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Services per health status.
    services: Family<StatusLabels, Gauge>,
    /// Current connection state (1 for the active state, 0 otherwise).
    connection_state: Family<ConnectionLabels, Gauge>,
    /// Channel events processed.
    events_total: Family<EventLabels, Counter>,
    /// Snapshot fetches performed.
    fetches_total: Family<FetchLabels, Counter>,
    /// Snapshot fetch duration histogram (in seconds).
    fetch_duration_seconds: Histogram,
    /// Reconnect attempts.
    reconnects_total: Counter,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // Create metrics
        let services = Family::<StatusLabels, Gauge>::default();
        let connection_state = Family::<ConnectionLabels, Gauge>::default();
        let events_total = Family::<EventLabels, Counter>::default();
        let fetches_total = Family::<FetchLabels, Counter>::default();
        // Buckets: 5ms, 12.5ms, 31ms, 78ms, 195ms, 488ms, 1.2s, 3s, 7.6s, 19s
        let fetch_duration_seconds = Histogram::new(exponential_buckets(0.005, 2.5, 10));
        let reconnects_total = Counter::default();

        // Register metrics
        registry.register(
            "lbwatch_services",
            "Monitored services by health status",
            services.clone(),
        );
        registry.register(
            "lbwatch_connection_state",
            "Update channel state (1 for the current state)",
            connection_state.clone(),
        );
        registry.register(
            "lbwatch_events",
            "Total number of update channel events received",
            events_total.clone(),
        );
        registry.register(
            "lbwatch_snapshot_fetches",
            "Total number of snapshot fetches",
            fetches_total.clone(),
        );
        registry.register(
            "lbwatch_snapshot_fetch_duration_seconds",
            "Snapshot fetch duration in seconds",
            fetch_duration_seconds.clone(),
        );
        registry.register(
            "lbwatch_reconnects",
            "Total number of update channel reconnect attempts",
            reconnects_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                services,
                connection_state,
                events_total,
                fetches_total,
                fetch_duration_seconds,
                reconnects_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Publish the current fleet counts.
    pub fn set_fleet(&self, summary: &FleetSummary) {
        for status in HealthStatus::ALL {
            let labels = StatusLabels {
                status: status.into(),
            };
            self.inner
                .services
                .get_or_create(&labels)
                .set(summary.count(status) as i64);
        }
    }

    /// Mark `status` as the current connection state.
    pub fn set_connection_status(&self, status: ConnectionStatus) {
        for candidate in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
        ] {
            let labels = ConnectionLabels {
                state: candidate.into(),
            };
            self.inner
                .connection_state
                .get_or_create(&labels)
                .set(i64::from(candidate == status));
        }
    }

    /// Record a decoded channel event.
    pub fn record_event(&self, kind: EventKind) {
        let labels = EventLabels { kind: kind.into() };
        self.inner.events_total.get_or_create(&labels).inc();
    }

    /// Record a frame that could not be decoded.
    pub fn record_malformed(&self) {
        let labels = EventLabels {
            kind: EventKindLabel::Malformed,
        };
        self.inner.events_total.get_or_create(&labels).inc();
    }

    /// Record a completed snapshot fetch.
    pub fn record_fetch(&self, trigger: FetchTrigger, success: bool, duration: Duration) {
        let labels = FetchLabels {
            trigger,
            result: if success {
                FetchResult::Success
            } else {
                FetchResult::Failure
            },
        };
        self.inner.fetches_total.get_or_create(&labels).inc();
        self.inner
            .fetch_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Record a reconnect attempt.
    pub fn record_reconnect(&self) {
        self.inner.reconnects_total.inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
