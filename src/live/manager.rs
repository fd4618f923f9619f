//! Connection manager for the live update channel.
//!
//! Owns the channel lifecycle:
//!
//! ```text
//! disconnected ──▶ connecting ──▶ connected
//!      ▲               │              │
//!      └───────────────┴──────────────┘
//!        (connect failure, close, error)
//! ```
//!
//! Entering `disconnected` (including at startup) performs exactly one
//! fallback snapshot fetch. Events are applied to the store one at a time in
//! arrival order; refresh requests are serialized through the same loop so
//! the store only ever has one writer.

use crate::client::{FetchError, SnapshotFetcher};
use crate::config::{Config, ReconnectConfig};
use crate::health::FleetSummary;
use crate::live::backoff::Backoff;
use crate::live::channel::{ChannelConnector, FrameStream, TransportError};
use crate::live::protocol::{decode_event, ChannelEvent, EventKind};
use crate::metrics::{FetchTrigger, MetricsCollector};
use crate::model::ServiceKey;
use crate::state::{ServiceStore, StateView, UpsertOutcome};
use crate::util::SessionId;
use futures::StreamExt;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Connection status of the update channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        })
    }
}

/// What observers can see of the connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkState {
    pub status: ConnectionStatus,
    /// Kind of the most recently applied channel event.
    pub last_event: Option<EventKind>,
    /// Service touched by that event; `None` after a full snapshot.
    pub last_service: Option<ServiceKey>,
    /// Error of the last snapshot fetch; cleared by the next success.
    pub last_error: Option<String>,
    /// When data last changed, from either the channel or a fetch.
    pub last_update: Option<SystemTime>,
    /// A snapshot fetch is in flight.
    pub refreshing: bool,
    /// Consecutive failed reconnect attempts.
    pub reconnect_attempts: u32,
    /// Fallback fetches performed on entering `disconnected`.
    pub fallback_fetches: u64,
}

/// Timing settings for the manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub reconnect: ReconnectConfig,
    pub connect_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reconnect: config.reconnect.clone(),
            connect_timeout: config.producer.connect_timeout,
            fetch_timeout: config.producer.fetch_timeout,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

enum Command {
    Refresh(oneshot::Sender<Result<usize, FetchError>>),
}

/// Everything the event loop needs besides the transport and command queue.
struct Core<F> {
    fetcher: F,
    store: Arc<ServiceStore>,
    state: watch::Sender<LinkState>,
    metrics: MetricsCollector,
    fetch_timeout: Duration,
}

/// Drives the update channel and feeds the service store.
pub struct ConnectionManager<C, F> {
    connector: C,
    core: Core<F>,
    commands: mpsc::Receiver<Command>,
    settings: ManagerSettings,
}

/// Cheap handle for observers and for forcing a refresh.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<LinkState>,
    store: Arc<ServiceStore>,
}

impl<C, F> ConnectionManager<C, F>
where
    C: ChannelConnector,
    F: SnapshotFetcher,
{
    /// Create a manager and the handle used to observe it.
    pub fn new(
        connector: C,
        fetcher: F,
        store: Arc<ServiceStore>,
        settings: ManagerSettings,
    ) -> (Self, ManagerHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(LinkState::default());

        let handle = ManagerHandle {
            commands: command_tx,
            state: state_rx,
            store: Arc::clone(&store),
        };

        let manager = Self {
            connector,
            core: Core {
                fetcher,
                store,
                state: state_tx,
                metrics: MetricsCollector::new(),
                fetch_timeout: settings.fetch_timeout,
            },
            commands: command_rx,
            settings,
        };

        (manager, handle)
    }

    /// Report into this collector instead of a private one.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.core.metrics = metrics;
        self
    }

    /// Run until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let ConnectionManager {
            connector,
            core,
            mut commands,
            settings,
        } = self;

        info!(endpoint = %connector.endpoint(), "connection manager starting");
        let Err(Stopped) = drive(&connector, &core, &mut commands, &settings, &mut shutdown).await;
        core.state.send_modify(|s| s.refreshing = false);
        info!("connection manager shutting down");
    }
}

/// The shutdown signal fired while waiting.
struct Stopped;

/// Why a connected session ended.
enum SessionEnd {
    Shutdown,
    Lost(String),
}

/// The connection state machine. Only returns once shutdown is signalled.
async fn drive<C, F>(
    connector: &C,
    core: &Core<F>,
    commands: &mut mpsc::Receiver<Command>,
    settings: &ManagerSettings,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<Infallible, Stopped>
where
    C: ChannelConnector,
    F: SnapshotFetcher,
{
    let mut backoff = Backoff::new(&settings.reconnect);

    // The initial state is `disconnected`, which warrants a fetch of its own.
    core.set_status(ConnectionStatus::Disconnected);
    core.fallback_fetch(shutdown).await?;

    loop {
        core.set_status(ConnectionStatus::Connecting);
        let session = SessionId::new();
        debug!(session = %session, endpoint = %connector.endpoint(), "opening update channel");

        let connect = timeout(settings.connect_timeout, connector.connect());
        tokio::pin!(connect);

        let opened = loop {
            tokio::select! {
                result = &mut connect => break result,
                Some(command) = commands.recv() => core.handle_command(command, shutdown).await?,
                _ = shutdown.recv() => return Err(Stopped),
            }
        };

        let opened = opened
            .unwrap_or_else(|_| Err(TransportError::ConnectTimeout(settings.connect_timeout)));

        match opened {
            Ok(frames) => {
                backoff.reset();
                core.state.send_modify(|s| s.reconnect_attempts = 0);
                core.set_status(ConnectionStatus::Connected);
                info!(session = %session, "update channel connected");

                match core.stream(frames, commands, shutdown).await {
                    SessionEnd::Shutdown => return Err(Stopped),
                    SessionEnd::Lost(reason) => {
                        warn!(session = %session, reason = %reason, "update channel lost");
                    }
                }
            }
            Err(e) => {
                warn!(session = %session, error = %e, "failed to open update channel");
            }
        }

        core.set_status(ConnectionStatus::Disconnected);
        core.fallback_fetch(shutdown).await?;

        let Some(delay) = backoff.next_delay() else {
            warn!(
                attempts = backoff.attempts(),
                "reconnect attempts exhausted, serving refresh requests only"
            );
            loop {
                tokio::select! {
                    Some(command) = commands.recv() => core.handle_command(command, shutdown).await?,
                    _ = shutdown.recv() => return Err(Stopped),
                }
            }
        };

        core.metrics.record_reconnect();
        core.state
            .send_modify(|s| s.reconnect_attempts = backoff.attempts());
        debug!(delay = ?delay, attempt = backoff.attempts(), "waiting before reconnect");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                Some(command) = commands.recv() => core.handle_command(command, shutdown).await?,
                _ = shutdown.recv() => return Err(Stopped),
            }
        }
    }
}

impl<F: SnapshotFetcher> Core<F> {
    fn set_status(&self, status: ConnectionStatus) {
        self.state.send_if_modified(|s| {
            if s.status == status {
                return false;
            }
            debug!(from = %s.status, to = %status, "connection status changed");
            s.status = status;
            true
        });
        self.metrics.set_connection_status(status);
    }

    /// Pump frames from an open channel until it ends.
    async fn stream(
        &self,
        mut frames: FrameStream,
        commands: &mut mpsc::Receiver<Command>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                frame = frames.next() => match frame {
                    Some(Ok(text)) => self.process_frame(&text),
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_string()),
                },
                Some(command) = commands.recv() => {
                    if self.handle_command(command, shutdown).await.is_err() {
                        return SessionEnd::Shutdown;
                    }
                }
                _ = shutdown.recv() => return SessionEnd::Shutdown,
            }
        }
    }

    /// Decode and apply one frame. Bad frames are logged and dropped.
    fn process_frame(&self, frame: &str) {
        match decode_event(frame) {
            Ok(event) => self.apply_event(event),
            Err(e) => {
                warn!(error = %e, bytes = frame.len(), "dropping malformed payload");
                self.metrics.record_malformed();
            }
        }
    }

    fn apply_event(&self, event: ChannelEvent) {
        let kind = event.kind();
        self.metrics.record_event(kind);

        let updated = match event {
            ChannelEvent::InitialData(services) => {
                self.store.load_snapshot(services);
                None
            }
            ChannelEvent::HealthUpdate(service) => {
                let key = service.key();
                if self.store.apply_update(service) == UpsertOutcome::Stale {
                    debug!(service = %key, "stale update ignored");
                    return;
                }
                Some(key)
            }
            ChannelEvent::Unrecognized { kind } => {
                debug!(kind = %kind, "ignoring unrecognized event");
                return;
            }
        };

        self.state.send_modify(|s| {
            s.last_event = Some(kind);
            s.last_service = updated;
            s.last_update = Some(SystemTime::now());
        });
        self.metrics.set_fleet(&self.store.fleet_summary());
    }

    async fn handle_command(
        &self,
        command: Command,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), Stopped> {
        match command {
            Command::Refresh(reply) => {
                // On shutdown the reply is dropped and the caller sees the
                // manager as stopped.
                let result = self.fetch_snapshot(FetchTrigger::Refresh, shutdown).await?;
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
        }
        Ok(())
    }

    async fn fallback_fetch(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), Stopped> {
        self.state.send_modify(|s| s.fallback_fetches += 1);
        let _ = self.fetch_snapshot(FetchTrigger::Fallback, shutdown).await?;
        Ok(())
    }

    /// Fetch a full snapshot and load it. On failure the store is untouched.
    async fn fetch_snapshot(
        &self,
        trigger: FetchTrigger,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Result<usize, FetchError>, Stopped> {
        self.state.send_modify(|s| s.refreshing = true);
        let started = Instant::now();

        let fetched = tokio::select! {
            fetched = timeout(self.fetch_timeout, self.fetcher.fetch_services()) => fetched,
            _ = shutdown.recv() => {
                debug!(trigger = ?trigger, "snapshot fetch abandoned on shutdown");
                return Err(Stopped);
            }
        };
        let result = fetched.unwrap_or_else(|_| Err(FetchError::Timeout(self.fetch_timeout)));
        self.metrics
            .record_fetch(trigger, result.is_ok(), started.elapsed());

        match result {
            Ok(services) => {
                let count = services.len();
                self.store.load_snapshot(services);
                self.metrics.set_fleet(&self.store.fleet_summary());
                self.state.send_modify(|s| {
                    s.refreshing = false;
                    s.last_error = None;
                    s.last_update = Some(SystemTime::now());
                });
                info!(trigger = ?trigger, services = count, "snapshot fetched");
                Ok(Ok(count))
            }
            Err(e) => {
                warn!(trigger = ?trigger, error = %e, "snapshot fetch failed, keeping current state");
                self.state.send_modify(|s| {
                    s.refreshing = false;
                    s.last_error = Some(e.to_string());
                });
                Ok(Err(e))
            }
        }
    }
}

impl ManagerHandle {
    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// Full observable state of the connection.
    pub fn link_state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    /// Watch for changes to the connection state.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Current services, in display order.
    pub fn services(&self) -> Arc<StateView> {
        self.store.snapshot_view()
    }

    /// Current status counts.
    pub fn fleet_summary(&self) -> FleetSummary {
        self.store.fleet_summary()
    }

    /// The store this manager writes to.
    pub fn store(&self) -> &Arc<ServiceStore> {
        &self.store
    }

    /// Force a snapshot fetch regardless of connection state.
    ///
    /// Returns the number of services loaded.
    pub async fn refresh(&self) -> Result<usize, FetchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let stopped = || FetchError::Unavailable("connection manager stopped".to_string());

        self.commands
            .send(Command::Refresh(reply_tx))
            .await
            .map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())?
    }
}
