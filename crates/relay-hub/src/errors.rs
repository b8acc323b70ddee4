//! Error types for the hub, registry, connections, and transports.

use std::time::Duration;

use relay_core::MessageKind;
use thiserror::Error;

/// Dispatch failures.
#[derive(Debug, Error)]
pub enum HubError {
    /// No handler for the kind; the frame went to the `ERR` fallback.
    #[error("no handler registered for kind {kind}")]
    NoHandler {
        /// The unroutable kind.
        kind: MessageKind,
    },
    /// The hub no longer accepts dispatches.
    #[error("hub is shutting down")]
    ShuttingDown,
    /// The worker behind a route exited.
    #[error("worker for kind {kind} has stopped")]
    WorkerStopped {
        /// Route whose worker is gone.
        kind: MessageKind,
    },
    /// Workers need a tokio runtime to run on.
    #[error("hub must be built inside a tokio runtime")]
    NoRuntime,
}

/// Connection registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A live connection already holds this id.
    #[error("connection id {id:?} is already registered")]
    Duplicate {
        /// The contested id.
        id: String,
    },
}

/// Failures of the connection capability surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection stopped accepting outbound payloads.
    #[error("connection is closing")]
    Closing,
    /// The write duty is gone.
    #[error("connection is closed")]
    Closed,
}

/// Socket-level failures reported by a [`FrameSink`](crate::transport::FrameSink)
/// or [`FrameStream`](crate::transport::FrameStream).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer or the library already closed the socket.
    #[error("transport closed")]
    Closed,
    /// A deadline elapsed.
    #[error("{op} timed out after {after:?}")]
    Timeout {
        /// What was being attempted.
        op: &'static str,
        /// The deadline.
        after: Duration,
    },
    /// Anything else the socket library reported.
    #[error("transport error: {0}")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Whether this is an orderly end of the connection rather than a fault.
    pub fn is_expected_close(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
