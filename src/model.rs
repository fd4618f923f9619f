//! Monitored service data types.
//!
//! These mirror the JSON the producer emits on both the snapshot endpoint
//! and the live update channel.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Provisioning state value that counts as healthy.
pub const SUCCEEDED: &str = "Succeeded";

/// A single backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    /// Private IP of the instance, if the producer knows it.
    #[serde(default, rename = "privateIPAddress")]
    pub private_ip_address: Option<String>,

    /// Producer-reported lifecycle state (`Succeeded`, `Failed`, ...).
    /// Missing reads as empty, which is not healthy.
    #[serde(default, deserialize_with = "null_as_default")]
    pub provisioning_state: String,

    /// Opaque resource identifier.
    #[serde(default)]
    pub id: Option<String>,
}

impl Address {
    /// Create an address with only a provisioning state.
    pub fn new(provisioning_state: impl Into<String>) -> Self {
        Self {
            private_ip_address: None,
            provisioning_state: provisioning_state.into(),
            id: None,
        }
    }

    /// Whether the provisioning state is exactly `Succeeded`.
    pub fn is_healthy(&self) -> bool {
        self.provisioning_state == SUCCEEDED
    }

    /// Last path segment of the resource id.
    pub fn short_id(&self) -> Option<&str> {
        self.id.as_deref().and_then(|id| id.rsplit('/').next())
    }
}

/// Named group of addresses behind a service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendPool {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<Address>,
}

impl BackendPool {
    /// Create a pool from a name and its addresses.
    pub fn new(name: impl Into<String>, addresses: Vec<Address>) -> Self {
        Self {
            name: name.into(),
            addresses,
        }
    }
}

/// Stable identity of a service: resource group plus load balancer name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub resource_group: String,
    pub load_balancer: String,
}

impl ServiceKey {
    pub fn new(resource_group: impl Into<String>, load_balancer: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            load_balancer: load_balancer.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.load_balancer)
    }
}

/// One monitored load-balancing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub resource_group_name: String,

    pub load_balancer_name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,

    #[serde(default, rename = "frontendIPAddress")]
    pub frontend_ip_address: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub backend_pools: Vec<BackendPool>,

    /// RFC 3339 timestamp, kept exactly as received.
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl Service {
    /// Create a service with no pools.
    pub fn new(resource_group: impl Into<String>, load_balancer: impl Into<String>) -> Self {
        Self {
            resource_group_name: resource_group.into(),
            load_balancer_name: load_balancer.into(),
            location: String::new(),
            frontend_ip_address: None,
            backend_pools: Vec::new(),
            last_updated: None,
        }
    }

    /// Builder-style helper to attach pools.
    pub fn with_pools(mut self, pools: Vec<BackendPool>) -> Self {
        self.backend_pools = pools;
        self
    }

    /// The identity of this service.
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.resource_group_name, &self.load_balancer_name)
    }

    /// Whether this service has the given identity, without allocating.
    pub fn has_key(&self, key: &ServiceKey) -> bool {
        self.resource_group_name == key.resource_group
            && self.load_balancer_name == key.load_balancer
    }

    /// Parse `lastUpdated`, if present and well-formed.
    pub fn last_updated_at(&self) -> Option<SystemTime> {
        self.last_updated
            .as_deref()
            .and_then(|s| humantime::parse_rfc3339_weak(s).ok())
    }

    /// Find a backend pool by name (first match).
    pub fn pool(&self, name: &str) -> Option<&BackendPool> {
        self.backend_pools.iter().find(|p| p.name == name)
    }
}

/// Read an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
