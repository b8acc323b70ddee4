//! Socket abstraction the connection actor reads from and writes to.
//!
//! The server and client crates wrap their websocket halves in newtypes
//! implementing [`FrameSink`] and [`FrameStream`]; [`memory`] provides a
//! connected pair for tests.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::TransportError;

/// Close frame contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close status code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseInfo {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (shutdown, navigation).
    pub const GOING_AWAY: u16 = 1001;
    /// Policy violation, used for rejected duplicate ids.
    pub const POLICY: u16 = 1008;

    /// Build a close frame.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A normal closure with `reason`.
    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(Self::NORMAL, reason)
    }

    /// Whether the code marks an orderly close.
    pub fn is_expected(&self) -> bool {
        matches!(self.code, Self::NORMAL | Self::GOING_AWAY)
    }
}

/// One websocket message, independent of the socket library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    /// Binary data frame; carries an encoded relay frame.
    Binary(Bytes),
    /// Text data frame; treated as its UTF-8 bytes.
    Text(String),
    /// Protocol ping.
    Ping(Bytes),
    /// Protocol pong.
    Pong(Bytes),
    /// Close control frame.
    Close(Option<CloseInfo>),
}

/// Write half of a socket.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one message.
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError>;

    /// Flush and shut the write half.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a socket.
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Next message; `None` once the peer is gone.
    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>>;
}
