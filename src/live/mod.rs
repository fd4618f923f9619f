//! Live update channel: transport, wire protocol and connection lifecycle.

mod backoff;
mod channel;
mod manager;
mod protocol;

pub use backoff::Backoff;
pub use channel::{ChannelConnector, FrameStream, TransportError, WebSocketConnector};
pub use manager::{ConnectionManager, ConnectionStatus, LinkState, ManagerHandle, ManagerSettings};
pub use protocol::{decode_event, ChannelEvent, EventKind, ProtocolError, HEALTH_UPDATE, INITIAL_DATA};
