//! # relay-hub
//!
//! The transport-independent core of the relay hub.
//!
//! - **Hub**: kind-keyed handler registry with one FIFO queue and worker per kind
//! - **Connection**: capability surface handed to handlers, plus the actor
//!   whose read and write duties drive the socket
//! - **Registry**: server-side map from connection id to live connection
//! - **Policy**: which kinds a peer may originate
//! - **Transport**: the [`FrameSink`]/[`FrameStream`] seam the server and
//!   client crates implement over their websocket libraries

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod fallback;
pub mod handler;
pub mod hub;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod transport;

pub use connection::{
    ActorHandle, Connection, ConnectionActor, ConnectionConfig, ConnectionState, Inbound, Mailbox, Side,
};
pub use errors::{ConnectionError, HubError, RegistryError, TransportError};
pub use fallback::NoSuchKindHandler;
pub use handler::{FnHandler, MessageContext, MessageHandler, handler_fn};
pub use hub::{DEFAULT_QUEUE_CAPACITY, Hub, HubBuilder};
pub use policy::PeerPolicy;
pub use registry::ConnectionRegistry;
pub use transport::{CloseInfo, FrameSink, FrameStream, WireMessage};
