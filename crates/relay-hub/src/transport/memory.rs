//! In-memory transport: two connected endpoints over unbounded channels.
//!
//! Messages sent on one endpoint's sink arrive on the other's stream.
//! Closing a sink ends the opposite stream.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameSink, FrameStream, WireMessage};
use crate::errors::TransportError;

type Item = Result<WireMessage, TransportError>;

/// Write half of an in-memory endpoint.
#[derive(Debug)]
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Item>>,
}

/// Read half of an in-memory endpoint.
#[derive(Debug)]
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Item>,
}

/// Both halves of one endpoint.
pub type Endpoint = (MemorySink, MemoryStream);

/// Two endpoints wired to each other.
pub fn pair() -> (Endpoint, Endpoint) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        (MemorySink { tx: Some(a_tx) }, MemoryStream { rx: b_rx }),
        (MemorySink { tx: Some(b_tx) }, MemoryStream { rx: a_rx }),
    )
}

impl MemorySink {
    /// Deliver a transport error to the other side's stream.
    pub fn fail(&mut self, error: TransportError) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// Whether [`FrameSink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl MemoryStream {
    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Item> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Ok(message)).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Option<Item> {
        self.rx.recv().await
    }
}
