//! axum `WebSocket` halves as relay transports.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_hub::{CloseInfo, FrameSink, FrameStream, TransportError, WireMessage};

/// Write half of an accepted socket.
pub struct AxumSink(SplitSink<WebSocket, Message>);

/// Read half of an accepted socket.
pub struct AxumStream(SplitStream<WebSocket>);

/// Split an upgraded socket into relay transport halves.
pub fn split(socket: WebSocket) -> (AxumSink, AxumStream) {
    let (sink, stream) = socket.split();
    (AxumSink(sink), AxumStream(stream))
}

#[async_trait]
impl FrameSink for AxumSink {
    async fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        self.0.send(to_axum(message)).await.map_err(transport_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(transport_error)
    }
}

#[async_trait]
impl FrameStream for AxumStream {
    async fn recv(&mut self) -> Option<Result<WireMessage, TransportError>> {
        let next = self.0.next().await?;
        Some(next.map(from_axum).map_err(transport_error))
    }
}

pub(crate) fn to_axum(message: WireMessage) -> Message {
    match message {
        WireMessage::Binary(data) => Message::Binary(data),
        WireMessage::Text(text) => Message::Text(text.into()),
        WireMessage::Ping(data) => Message::Ping(data),
        WireMessage::Pong(data) => Message::Pong(data),
        WireMessage::Close(info) => Message::Close(info.map(|info| CloseFrame {
            code: info.code,
            reason: info.reason.into(),
        })),
    }
}

fn from_axum(message: Message) -> WireMessage {
    match message {
        Message::Binary(data) => WireMessage::Binary(data),
        Message::Text(text) => WireMessage::Text(text.as_str().to_owned()),
        Message::Ping(data) => WireMessage::Ping(data),
        Message::Pong(data) => WireMessage::Pong(data),
        Message::Close(frame) => {
            WireMessage::Close(frame.map(|frame| CloseInfo::new(frame.code, frame.reason.as_str())))
        }
    }
}

/// What tungstenite prints for `ConnectionClosed` and `AlreadyClosed`.
///
/// axum boxes the error of whichever tungstenite release it links, which
/// need not be ours, so a typed downcast can miss. The messages have been
/// stable across releases.
const CLOSED_MESSAGES: [&str; 2] = ["Connection closed normally", "Trying to work with closed connection"];

/// Orderly closes become [`TransportError::Closed`]; the rest stay opaque.
fn transport_error(error: axum::Error) -> TransportError {
    let inner = error.into_inner();
    if is_orderly_close(&*inner) {
        TransportError::Closed
    } else {
        TransportError::Io(inner)
    }
}

fn is_orderly_close(error: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(error), |e| e.source()).any(|e| {
        let text = e.to_string();
        CLOSED_MESSAGES.iter().any(|closed| *closed == text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn messages_map_both_ways() {
        let cases = [
            WireMessage::Binary(Bytes::from_static(b"\x00\x01")),
            WireMessage::Text("hi".into()),
            WireMessage::Ping(Bytes::new()),
            WireMessage::Pong(Bytes::from_static(b"p")),
            WireMessage::Close(Some(CloseInfo::new(1008, "duplicate connection id"))),
            WireMessage::Close(None),
        ];
        for case in cases {
            assert_eq!(from_axum(to_axum(case.clone())), case);
        }
    }

    /// Stands in for a tungstenite error from a release other than ours.
    #[derive(Debug)]
    struct ForeignError(&'static str);

    impl std::fmt::Display for ForeignError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for ForeignError {}

    #[derive(Debug)]
    struct Handshake(ForeignError);

    impl std::fmt::Display for Handshake {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("websocket failure")
        }
    }

    impl std::error::Error for Handshake {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn closed_socket_is_expected_whatever_the_library_version() {
        for text in CLOSED_MESSAGES {
            let err = axum::Error::new(ForeignError(text));
            assert!(transport_error(err).is_expected_close(), "{text}");
        }
    }

    #[test]
    fn our_tungstenite_closes_are_expected() {
        use tokio_tungstenite::tungstenite::Error;
        assert!(transport_error(axum::Error::new(Error::ConnectionClosed)).is_expected_close());
        assert!(transport_error(axum::Error::new(Error::AlreadyClosed)).is_expected_close());
    }

    #[test]
    fn wrapped_close_is_found_through_sources() {
        let err = axum::Error::new(Handshake(ForeignError("Connection closed normally")));
        assert!(transport_error(err).is_expected_close());
    }

    #[test]
    fn other_failures_stay_opaque() {
        let err = axum::Error::new(std::io::Error::other("reset"));
        let mapped = transport_error(err);
        assert!(!mapped.is_expected_close());
        assert!(mapped.to_string().contains("reset"));
    }
}
