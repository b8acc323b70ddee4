//! tokio-tungstenite stream halves as relay transports.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_hub::{CloseInfo, FrameSink, FrameStream, TransportError, WireMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// A dialed socket.
pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a dialed socket.
pub struct TungsteniteSink(SplitSink<ClientSocket, Message>);

/// Read half of a dialed socket.
pub struct TungsteniteStream(SplitStream<ClientSocket>);

/// Split a dialed socket into relay transport halves.
pub fn split(socket: ClientSocket) -> (TungsteniteSink, TungsteniteStream) {
    let (sink, stream) = socket.split();
    (TungsteniteSink(sink), TungsteniteStream(stream))
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        self.0.send(to_tungstenite(message)).await.map_err(transport_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(transport_error)
    }
}

#[async_trait]
impl FrameStream for TungsteniteStream {
    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>> {
        loop {
            match self.0.next().await? {
                Ok(message) => {
                    if let Some(message) = from_tungstenite(message) {
                        return Some(Ok(message));
                    }
                }
                Err(e) => return Some(Err(transport_error(e))),
            }
        }
    }
}

fn to_tungstenite(message: WireMessage) -> Message {
    match message {
        WireMessage::Binary(data) => Message::Binary(data),
        WireMessage::Text(text) => Message::Text(text.into()),
        WireMessage::Ping(data) => Message::Ping(data),
        WireMessage::Pong(data) => Message::Pong(data),
        WireMessage::Close(info) => Message::Close(info.map(|info| CloseFrame {
            code: info.code.into(),
            reason: info.reason.into(),
        })),
    }
}

/// Raw frames never surface when reading, so they map to nothing.
fn from_tungstenite(message: Message) -> Option<WireMessage> {
    Some(match message {
        Message::Binary(data) => WireMessage::Binary(data),
        Message::Text(text) => WireMessage::Text(text.as_str().to_owned()),
        Message::Ping(data) => WireMessage::Ping(data),
        Message::Pong(data) => WireMessage::Pong(data),
        Message::Close(frame) => {
            WireMessage::Close(frame.map(|frame| CloseInfo::new(frame.code.into(), frame.reason.as_str())))
        }
        Message::Frame(_) => return None,
    })
}

fn transport_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(Box::new(other)),
    }
}
