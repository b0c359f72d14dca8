//! Session controller for the pulse link.
//!
//! [`Monitor`] owns the connection state, the aggregator and the handles of
//! the current session. Background threads only post [`LinkEvent`]s to its
//! queue. Every state change happens inside [`Monitor::pump`] (or
//! [`Monitor::wait`]) on the thread that owns the monitor, which then hands
//! back the resulting [`Update`]s in order.
//!
//! ```text
//!              connect()                handshake ok
//! Disconnected ─────────▶ Connecting ──────────────▶ Connected
//!      ▲                      │                          │
//!      │   handshake failed   │                          │ disconnect()
//!      │   or disconnect()    │                          │ or read failure
//!      └──────────────────────┴──────────────────────────┘
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::data::{AggregatorEvent, StatusBand, StreamAggregator, Thresholds, WindowResult};
use crate::error::MonitorError;
use crate::source::worker::{spawn_handshake, spawn_reader, EventSender};
use crate::source::{
    AlwaysGranted, Capability, Handles, LinkEvent, StopSignal, Transport, SERIAL_PORT_SERVICE,
};
use crate::store::{HealthRecord, NullStore, Store};

/// Lifecycle of the single device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Something the presentation layer should show.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A parsed reading and its band.
    Reading {
        value: f32,
        status: StatusBand,
        device_average: Option<f32>,
    },
    /// A closed window and the band of its average.
    Window {
        result: WindowResult,
        status: StatusBand,
    },
    /// Lifecycle change or status text.
    State {
        state: ConnectionState,
        message: String,
    },
    /// The session ended; live fields should be reset.
    Cleared,
}

/// Source of wall-clock time for window boundaries.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The fixed device a monitor talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub address: String,
    pub service_id: Uuid,
}

impl DeviceTarget {
    /// Target the serial port service at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            service_id: SERIAL_PORT_SERVICE,
        }
    }

    pub fn with_service(mut self, service_id: Uuid) -> Self {
        self.service_id = service_id;
        self
    }
}

struct Session {
    id: u64,
    handles: Handles,
    stop: StopSignal,
}

/// Owns one device session at a time and everything derived from it.
pub struct Monitor {
    transport: Arc<dyn Transport>,
    capability: Box<dyn Capability>,
    store: Box<dyn Store>,
    clock: Box<dyn Clock>,
    target: DeviceTarget,
    aggregator: StreamAggregator,
    state: ConnectionState,
    session: Option<Session>,
    next_session: u64,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<LinkEvent>,
    outbox: Vec<Update>,
    windows_saved: u64,
}

impl Monitor {
    /// Create a disconnected monitor.
    ///
    /// Defaults to [`AlwaysGranted`], [`NullStore`] and [`SystemClock`].
    pub fn new(
        transport: Arc<dyn Transport>,
        target: DeviceTarget,
        thresholds: Thresholds,
        window: Duration,
    ) -> Self {
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            transport,
            capability: Box::new(AlwaysGranted),
            store: Box::new(NullStore),
            aggregator: StreamAggregator::new(thresholds, window, clock.now()),
            clock,
            target,
            state: ConnectionState::Disconnected,
            session: None,
            next_session: 1,
            tx,
            rx,
            outbox: Vec::new(),
            windows_saved: 0,
        }
    }

    pub fn with_capability(mut self, capability: Box<dyn Capability>) -> Self {
        self.capability = capability;
        self
    }

    pub fn with_store(mut self, store: Box<dyn Store>) -> Self {
        self.store = store;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.aggregator.reset(clock.now());
        self.clock = clock;
        self
    }

    /// Start a session. Only valid while disconnected.
    pub fn connect(&mut self) -> Result<(), MonitorError> {
        if self.state != ConnectionState::Disconnected {
            return Err(MonitorError::AlreadyActive);
        }

        if !self.capability.has_capability() && !self.capability.request_capability() {
            tracing::warn!("Access to {} was not granted", self.target.address);
            self.emit_state(format!("Permission denied for {}", self.target.address));
            return Err(MonitorError::PermissionDenied);
        }

        let id = self.next_session;
        self.next_session += 1;

        tracing::info!(
            "Connecting to {} via {} (session {})",
            self.target.address,
            self.transport.describe(),
            id
        );

        let spawned = spawn_handshake(
            id,
            self.transport.clone(),
            self.target.address.clone(),
            self.target.service_id,
            self.tx.clone(),
        );
        self.begin_session(id, spawned)
    }

    /// Enter Connecting once the handshake thread is running.
    fn begin_session(
        &mut self,
        id: u64,
        spawned: io::Result<JoinHandle<()>>,
    ) -> Result<(), MonitorError> {
        if let Err(e) = spawned {
            tracing::error!("Failed to start handshake thread: {}", e);
            self.emit_state(format!("Could not start connection: {}", e));
            return Err(MonitorError::Spawn(e.to_string()));
        }

        self.session = Some(Session {
            id,
            handles: Handles::default(),
            stop: StopSignal::new(),
        });
        self.state = ConnectionState::Connecting;
        self.emit_state(format!("Connecting to {}...", self.target.address));
        Ok(())
    }

    /// End the current session, whether it is still connecting or live.
    pub fn disconnect(&mut self) -> Result<(), MonitorError> {
        match self.state {
            ConnectionState::Disconnected => Err(MonitorError::NotConnected),
            ConnectionState::Connecting => {
                tracing::info!("Connection attempt to {} cancelled", self.target.address);
                self.teardown("Connection cancelled".to_string());
                Ok(())
            }
            ConnectionState::Connected => {
                tracing::info!("Disconnecting from {}", self.target.address);
                self.teardown("Disconnected".to_string());
                Ok(())
            }
        }
    }

    /// Apply every queued link event and return the resulting updates.
    pub fn pump(&mut self) -> Vec<Update> {
        while let Ok(event) = self.rx.try_recv() {
            self.handle_event(event);
        }
        std::mem::take(&mut self.outbox)
    }

    /// Wait for at least one update.
    pub async fn wait(&mut self) -> Vec<Update> {
        if self.outbox.is_empty() {
            // The monitor holds a sender, so the queue never closes.
            if let Some(event) = self.rx.recv().await {
                self.handle_event(event);
            }
        }
        self.pump()
    }

    fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected { session, mut link } => {
                if !self.is_current(session, ConnectionState::Connecting) {
                    tracing::debug!("Closing link from stale session {}", session);
                    self.log_close_failures(link.handles.close_all());
                    return;
                }

                let now = self.clock.now();
                self.aggregator.reset(now);

                let Some(current) = self.session.as_mut() else {
                    return;
                };
                current.handles = link.handles;
                let spawned =
                    spawn_reader(session, link.reader, self.tx.clone(), current.stop.clone());

                match spawned {
                    Ok(_) => {
                        self.state = ConnectionState::Connected;
                        tracing::info!("Connected to {}", self.target.address);
                        self.emit_state(format!("Connected to {}", self.target.address));
                    }
                    Err(e) => {
                        self.teardown(format!("Could not start reader: {}", e));
                    }
                }
            }
            LinkEvent::ConnectFailed { session, error } => {
                if !self.is_current(session, ConnectionState::Connecting) {
                    return;
                }
                tracing::warn!("{}", error);
                self.session = None;
                self.state = ConnectionState::Disconnected;
                self.emit_state(error.to_string());
            }
            LinkEvent::Chunk { session, bytes } => {
                if !self.is_current(session, ConnectionState::Connected) {
                    return;
                }
                let now = self.clock.now();
                for event in self.aggregator.ingest(&bytes, now) {
                    self.apply(event);
                }
            }
            LinkEvent::ReadFailed { session, error } => {
                if !self.is_current(session, ConnectionState::Connected) {
                    return;
                }
                tracing::warn!("Link to {} failed: {}", self.target.address, error);
                self.teardown(format!("Connection lost: {}", error));
            }
        }
    }

    fn apply(&mut self, event: AggregatorEvent) {
        match event {
            AggregatorEvent::Reading { reading, status } => {
                self.outbox.push(Update::Reading {
                    value: reading.bpm,
                    status,
                    device_average: reading.device_average,
                });
            }
            AggregatorEvent::Window { result, status } => {
                self.persist(&result);
                self.outbox.push(Update::Window { result, status });
            }
        }
    }

    fn persist(&mut self, result: &WindowResult) {
        let record = HealthRecord::from_window(result);
        let id = Uuid::new_v4();
        match self.store.save(id, &record) {
            Ok(()) => {
                self.windows_saved += 1;
                tracing::debug!("Saved window {} to {}", id, self.store.describe());
            }
            Err(e) => tracing::warn!("Failed to save window {}: {}", id, e),
        }
    }

    /// Stop the worker, release the handles and report the disconnect.
    fn teardown(&mut self, message: String) {
        if let Some(mut session) = self.session.take() {
            session.stop.stop();
            let failures = session.handles.close_all();
            self.log_close_failures(failures);
        }
        self.state = ConnectionState::Disconnected;
        self.emit_state(message);
        self.outbox.push(Update::Cleared);
    }

    fn log_close_failures(&self, failures: Vec<(&'static str, std::io::Error)>) {
        for (name, e) in failures {
            tracing::warn!("Failed to close {} of {}: {}", name, self.target.address, e);
        }
    }

    fn is_current(&self, session: u64, expected: ConnectionState) -> bool {
        self.state == expected && self.session.as_ref().map(|s| s.id) == Some(session)
    }

    fn emit_state(&mut self, message: String) {
        self.outbox.push(Update::State {
            state: self.state,
            message,
        });
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    pub fn aggregator(&self) -> &StreamAggregator {
        &self.aggregator
    }

    pub fn transport_description(&self) -> String {
        self.transport.describe()
    }

    pub fn store_description(&self) -> String {
        self.store.describe()
    }

    /// Windows handed to the store without error.
    pub fn windows_saved(&self) -> u64 {
        self.windows_saved
    }

    /// Whether the session holds no open handles.
    pub fn is_released(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.handles.is_released())
            .unwrap_or(true)
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("target", &self.target)
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("session", &self.session.as_ref().map(|s| s.id))
            .finish()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop.stop();
            let failures = session.handles.close_all();
            self.log_close_failures(failures);
        }
    }
}
