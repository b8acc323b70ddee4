//! One live socket and its capability surface.
//!
//! A [`Connection`] is shared (`Arc`) between its read duty, its write duty,
//! every handler that received a frame from it, and (server side) the
//! registry. The duties themselves live in [`actor`].
//!
//! Lifecycle: `Open → Closing → Closed`, one way.
//! - [`Connection::send_message`] is accepted only while `Open`.
//! - [`Connection::finish`] and [`Connection::last_message`] move to
//!   `Closing` and let the write duty end the socket politely.
//! - [`Connection::close`] moves to `Closing` and stops both duties at once.
//! - The actor marks the connection `Closed` once both duties ended.

pub mod actor;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use relay_core::Deferred;
use relay_settings::ConnectionSettings;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::ConnectionError;
use crate::registry::ConnectionRegistry;
use crate::transport::CloseInfo;

pub use actor::{ActorHandle, ConnectionActor, Inbound};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Which end of the socket this process is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Accepted the connection.
    Server,
    /// Dialed the connection.
    Client,
}

impl Side {
    /// `"server"` or `"client"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepting outbound payloads.
    Open,
    /// Shutting down; no new payloads accepted.
    Closing,
    /// Both duties ended.
    Closed,
}

/// Limits and timers for one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Largest inbound frame.
    pub read_limit: usize,
    /// Maximum wait for the next inbound frame.
    pub read_timeout: Duration,
    /// Deadline for writing a payload or close frame.
    pub write_timeout: Duration,
    /// Deadline for writing a ping.
    pub ping_write_timeout: Duration,
    /// Ping period.
    pub ping_interval: Duration,
    /// Heartbeat check period.
    pub heartbeat_check_interval: Duration,
    /// Silence after which the peer is considered dead.
    pub heartbeat_timeout: Duration,
    /// Delay between a close decision and registry cleanup.
    pub close_grace: Duration,
    /// Outbound queue bound.
    pub outbound_capacity: usize,
    /// Dispatches allowed in flight at once.
    pub max_inflight_dispatches: usize,
    /// Retry bound for deferred cleanup.
    pub cleanup_attempts: u32,
}

impl ConnectionConfig {
    /// Convert loaded settings.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            read_limit: settings.read_limit_bytes,
            read_timeout: Duration::from_millis(settings.read_timeout_ms),
            write_timeout: Duration::from_millis(settings.write_timeout_ms),
            ping_write_timeout: Duration::from_millis(settings.ping_write_timeout_ms),
            ping_interval: Duration::from_millis(settings.ping_interval_ms),
            heartbeat_check_interval: Duration::from_millis(settings.heartbeat_check_interval_ms),
            heartbeat_timeout: Duration::from_millis(settings.heartbeat_timeout_ms),
            close_grace: Duration::from_millis(settings.close_grace_ms),
            outbound_capacity: settings.outbound_capacity,
            max_inflight_dispatches: settings.max_inflight_dispatches,
            cleanup_attempts: settings.cleanup_attempts,
        }
    }

    /// Override the outbound queue bound.
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_settings(&ConnectionSettings::default())
    }
}

/// Receiving ends of a connection's queues, consumed by the write duty.
pub struct Mailbox {
    outbound: mpsc::Receiver<Bytes>,
    control: mpsc::Receiver<CloseInfo>,
}

impl Mailbox {
    /// Next queued outbound payload; `None` once the queue is closed and empty.
    pub async fn recv_outbound(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Queued outbound payload, without waiting.
    pub fn try_recv_outbound(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }
}

/// A live socket as seen by handlers and the registry.
pub struct Connection {
    id: String,
    serial: u64,
    side: Side,
    config: ConnectionConfig,
    connected_at: Instant,
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    control: mpsc::Sender<CloseInfo>,
    close_token: CancellationToken,
    closing: AtomicBool,
    close_called: AtomicBool,
    closed: AtomicBool,
    last_heartbeat: Mutex<Instant>,
    registry: Mutex<Option<Weak<ConnectionRegistry>>>,
    inflight: Arc<Semaphore>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("serial", &self.serial)
            .field("side", &self.side)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection and the mailbox its write duty will drain.
    pub fn new(id: impl Into<String>, side: Side, config: ConnectionConfig) -> (Arc<Self>, Mailbox) {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(1);
        let now = Instant::now();
        let conn = Arc::new(Self {
            id: id.into(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            side,
            inflight: Arc::new(Semaphore::new(config.max_inflight_dispatches.max(1))),
            config,
            connected_at: now,
            outbound: Mutex::new(Some(outbound_tx)),
            control: control_tx,
            close_token: CancellationToken::new(),
            closing: AtomicBool::new(false),
            close_called: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            last_heartbeat: Mutex::new(now),
            registry: Mutex::new(None),
        });
        let mailbox = Mailbox {
            outbound: outbound_rx,
            control: control_rx,
        };
        (conn, mailbox)
    }

    /// Connection id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Process-unique instance number; tells apart two connections that
    /// shared an id at different times.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Which end this process is.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Limits and timers.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Time since the connection was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else if self.closing.load(Ordering::Acquire) {
            ConnectionState::Closing
        } else {
            ConnectionState::Open
        }
    }

    /// Whether new payloads are refused.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Queue `frame` for the write duty, waiting while the queue is full.
    pub async fn send_message(&self, frame: Bytes) -> Result<(), ConnectionError> {
        if self.is_closing() {
            return Err(ConnectionError::Closing);
        }
        let Some(tx) = self.outbound.lock().clone() else {
            return Err(ConnectionError::Closing);
        };
        tokio::select! {
            biased;
            () = self.close_token.cancelled() => Err(ConnectionError::Closing),
            sent = tx.send(frame) => sent.map_err(|_| ConnectionError::Closed),
        }
    }

    /// Stop both duties now. Idempotent.
    ///
    /// When registered, the registry entry is removed after the close grace
    /// period, and only if it still refers to this instance.
    pub fn close(&self) {
        if self.close_called.swap(true, Ordering::AcqRel) {
            return;
        }
        self.closing.store(true, Ordering::Release);
        self.close_token.cancel();
        drop(self.outbound.lock().take());
        debug!(connection_id = %self.id, side = %self.side, "connection closing");
        self.schedule_unregister();
    }

    /// Send a close frame carrying `info` ahead of any queued payloads,
    /// refuse further payloads, and [`close`](Self::close) after the grace
    /// period unless the peer closes first.
    ///
    /// Fails with [`ConnectionError::Closing`] once the connection is
    /// already on its way out; `info` is then never sent.
    pub fn last_message(self: &Arc<Self>, info: CloseInfo) -> Result<(), ConnectionError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            debug!(
                connection_id = %self.id,
                code = info.code,
                reason = %info.reason,
                "already closing, final close frame dropped"
            );
            return Err(ConnectionError::Closing);
        }
        info!(connection_id = %self.id, code = info.code, reason = %info.reason, "sending final close frame");
        let _ = self.control.try_send(info);

        let conn = Arc::clone(self);
        if tokio::runtime::Handle::try_current().is_ok() {
            let _ = Deferred::new(self.config.close_grace)
                .schedule_once("close_after_last_message", async move { conn.close() });
        } else {
            conn.close();
        }
        Ok(())
    }

    /// Close the outbound queue. The write duty flushes what is queued,
    /// writes a normal close frame, and ends.
    pub fn finish(&self) {
        self.closing.store(true, Ordering::Release);
        drop(self.outbound.lock().take());
    }

    /// Record a liveness acknowledgment from the peer.
    pub fn mark_alive(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    /// When the peer last acknowledged a ping (or the connection opened).
    pub fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.lock()
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.close_token.cancelled().await;
    }

    pub(crate) fn close_token(&self) -> &CancellationToken {
        &self.close_token
    }

    pub(crate) fn inflight(&self) -> &Arc<Semaphore> {
        &self.inflight
    }

    pub(crate) fn mark_closed(&self) {
        self.closing.store(true, Ordering::Release);
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn attach_registry(&self, registry: Weak<ConnectionRegistry>) {
        *self.registry.lock() = Some(registry);
    }

    fn schedule_unregister(&self) {
        let Some(registry) = self.registry.lock().clone() else {
            return;
        };
        let id = self.id.clone();
        let serial = self.serial;

        if tokio::runtime::Handle::try_current().is_err() {
            if let Some(registry) = registry.upgrade() {
                let _ = registry.unregister_instance(&id, serial);
            }
            return;
        }

        let _ = Deferred::new(self.config.close_grace)
            .with_attempts(self.config.cleanup_attempts)
            .schedule("unregister_connection", move || {
                let registry = registry.clone();
                let id = id.clone();
                async move {
                    if let Some(registry) = registry.upgrade() {
                        if registry.unregister_instance(&id, serial) {
                            debug!(connection_id = %id, "unregistered after close grace");
                        }
                    }
                    Ok::<(), std::convert::Infallible>(())
                }
            });
    }
}
