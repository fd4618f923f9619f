//! Clients for the producer's HTTP API.

mod snapshot;

pub use snapshot::{FetchError, HttpSnapshotClient, SnapshotFetcher, SERVICES_PATH};
