//! Canonical in-memory state of all monitored services.
//!
//! Writers go through a single mutex; readers load an immutable view that is
//! swapped atomically after every mutation, so a reader never observes a
//! half-applied snapshot or update.

use crate::config::MergePolicy;
use crate::health::{fleet_summary, FleetSummary};
use crate::model::{Service, ServiceKey};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Result of upserting a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New key, appended to the end of the iteration order.
    Inserted,
    /// Existing key, value replaced in place.
    Replaced,
    /// Skipped because it is older than the stored value (monotonic policy only).
    Stale,
}

/// Point-in-time, read-only view of the canonical state.
#[derive(Debug, Default)]
pub struct StateView {
    services: Vec<Service>,
    changed_at: Option<SystemTime>,
    generation: u64,
}

impl StateView {
    /// Services in display order.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Find a service by key.
    pub fn get(&self, key: &ServiceKey) -> Option<&Service> {
        self.services.iter().find(|s| s.has_key(key))
    }

    /// Status counts for this view.
    pub fn fleet_summary(&self) -> FleetSummary {
        fleet_summary(&self.services)
    }

    /// Wall-clock time of the mutation that produced this view.
    pub fn changed_at(&self) -> Option<SystemTime> {
        self.changed_at
    }

    /// Number of mutations applied so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Writer-side state: ordered services plus a key index.
#[derive(Debug, Default)]
struct Canonical {
    services: Vec<Service>,
    index: HashMap<ServiceKey, usize>,
    generation: u64,
}

/// Owner of the canonical service map.
#[derive(Debug)]
pub struct ServiceStore {
    writer: Mutex<Canonical>,
    view: ArcSwap<StateView>,
    policy: MergePolicy,
}

impl ServiceStore {
    /// Create an empty store with the default (arrival order) merge policy.
    pub fn new() -> Self {
        Self::with_policy(MergePolicy::default())
    }

    /// Create an empty store with the given merge policy.
    pub fn with_policy(policy: MergePolicy) -> Self {
        Self {
            writer: Mutex::new(Canonical::default()),
            view: ArcSwap::from_pointee(StateView::default()),
            policy,
        }
    }

    /// The merge policy in effect.
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Replace the whole state with `services`, in their given order.
    ///
    /// A key that appears more than once keeps its first position and its
    /// last value.
    pub fn load_snapshot(&self, services: Vec<Service>) {
        let mut canonical = self.writer.lock();
        canonical.services.clear();
        canonical.index.clear();

        let received = services.len();
        for service in services {
            let key = service.key();
            match canonical.index.get(&key) {
                Some(&position) => canonical.services[position] = service,
                None => {
                    let position = canonical.services.len();
                    canonical.index.insert(key, position);
                    canonical.services.push(service);
                }
            }
        }

        if canonical.services.len() != received {
            debug!(
                received,
                kept = canonical.services.len(),
                "snapshot contained duplicate service keys"
            );
        }
        info!(services = canonical.services.len(), "snapshot loaded");

        self.publish(&mut canonical);
    }

    /// Upsert one service by key.
    pub fn apply_update(&self, service: Service) -> UpsertOutcome {
        let mut canonical = self.writer.lock();
        let key = service.key();

        let outcome = match canonical.index.get(&key).copied() {
            Some(position) => {
                if self.is_stale(&canonical.services[position], &service) {
                    debug!(service = %key, "skipping update older than stored state");
                    return UpsertOutcome::Stale;
                }
                canonical.services[position] = service;
                UpsertOutcome::Replaced
            }
            None => {
                let position = canonical.services.len();
                canonical.index.insert(key.clone(), position);
                canonical.services.push(service);
                UpsertOutcome::Inserted
            }
        };

        debug!(service = %key, outcome = ?outcome, "service updated");
        self.publish(&mut canonical);
        outcome
    }

    /// Current point-in-time view for readers.
    pub fn snapshot_view(&self) -> Arc<StateView> {
        self.view.load_full()
    }

    /// Current status counts.
    pub fn fleet_summary(&self) -> FleetSummary {
        self.view.load().fleet_summary()
    }

    /// Look up a service by key.
    pub fn get(&self, key: &ServiceKey) -> Option<Service> {
        self.view.load().get(key).cloned()
    }

    /// Wall-clock time of the last mutation.
    pub fn last_changed(&self) -> Option<SystemTime> {
        self.view.load().changed_at()
    }

    pub fn len(&self) -> usize {
        self.view.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.load().is_empty()
    }

    fn is_stale(&self, current: &Service, incoming: &Service) -> bool {
        match self.policy {
            MergePolicy::ArrivalOrder => false,
            MergePolicy::Monotonic => match (current.last_updated_at(), incoming.last_updated_at()) {
                (Some(current), Some(incoming)) => incoming < current,
                _ => false,
            },
        }
    }

    fn publish(&self, canonical: &mut Canonical) {
        canonical.generation += 1;
        self.view.store(Arc::new(StateView {
            services: canonical.services.clone(),
            changed_at: Some(SystemTime::now()),
            generation: canonical.generation,
        }));
    }
}

impl Default for ServiceStore {
    fn default() -> Self {
        Self::new()
    }
}
