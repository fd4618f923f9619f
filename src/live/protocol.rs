//! Update channel envelope decoding.
//!
//! Frames are JSON objects of the form `{"type": ..., "data": ...}`. Only two
//! kinds carry meaning; anything else decodes to [`ChannelEvent::Unrecognized`]
//! and is ignored by the caller.

use crate::model::Service;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Discriminant of a full snapshot event.
pub const INITIAL_DATA: &str = "INITIAL_DATA";

/// Discriminant of a single-service update event.
pub const HEALTH_UPDATE: &str = "HEALTH_UPDATE";

/// A decoded update channel event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Full snapshot of every service.
    InitialData(Vec<Service>),
    /// Upsert of one service.
    HealthUpdate(Service),
    /// Well-formed envelope with an unknown `type`.
    Unrecognized { kind: String },
}

impl ChannelEvent {
    /// Kind of this event, for logs and observers.
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::InitialData(_) => EventKind::InitialData,
            ChannelEvent::HealthUpdate(_) => EventKind::HealthUpdate,
            ChannelEvent::Unrecognized { .. } => EventKind::Unrecognized,
        }
    }
}

/// Payload-free event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InitialData,
    HealthUpdate,
    Unrecognized,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::InitialData => INITIAL_DATA,
            EventKind::HealthUpdate => HEALTH_UPDATE,
            EventKind::Unrecognized => "UNRECOGNIZED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame that could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode one text frame.
pub fn decode_event(frame: &str) -> Result<ChannelEvent, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(frame).map_err(ProtocolError::Envelope)?;

    match envelope.kind.as_str() {
        INITIAL_DATA => serde_json::from_value(envelope.data)
            .map(ChannelEvent::InitialData)
            .map_err(|source| ProtocolError::Payload {
                kind: INITIAL_DATA,
                source,
            }),
        HEALTH_UPDATE => serde_json::from_value(envelope.data)
            .map(ChannelEvent::HealthUpdate)
            .map_err(|source| ProtocolError::Payload {
                kind: HEALTH_UPDATE,
                source,
            }),
        _ => Ok(ChannelEvent::Unrecognized {
            kind: envelope.kind,
        }),
    }
}
