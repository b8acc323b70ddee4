//! `RelayClient`: dial a relay server and run the connection actor.

use std::sync::Arc;

use bytes::Bytes;
use relay_core::{IdGenerator, UuidGenerator};
use relay_hub::{ActorHandle, Connection, ConnectionActor, ConnectionError, Hub, Inbound, PeerPolicy, Side};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info, warn};

use crate::adapter;
use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};

/// A dialed connection with its actor running.
pub struct RelayClient {
    actor: ActorHandle,
    hub: Arc<Hub>,
    config: ClientConfig,
}

impl RelayClient {
    /// Dial `config.url`, then start the read and write duties.
    ///
    /// Frames from the server are checked against `policy` and dispatched
    /// into `hub`.
    pub async fn connect(config: ClientConfig, hub: Hub, policy: PeerPolicy) -> Result<Self> {
        let url = config.connect_url()?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.connection.read_limit);
        ws_config.max_frame_size = Some(config.connection.read_limit);

        let (socket, response) = connect_async_with_config(url.as_str(), Some(ws_config), true)
            .await
            .map_err(|e| ClientError::Connect {
                url: url.clone(),
                source: Box::new(e),
            })?;
        debug!(%url, status = %response.status(), "upgrade accepted");

        let local_id = match config.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => UuidGenerator.next_id(),
        };
        let (conn, mailbox) = Connection::new(local_id, Side::Client, config.connection.clone());
        let hub = Arc::new(hub);
        let (sink, stream) = adapter::split(socket);
        let actor = ConnectionActor::spawn(
            Arc::clone(&conn),
            mailbox,
            sink,
            stream,
            Inbound::new(Arc::clone(&hub), Arc::new(policy)),
        );

        info!(%url, connection_id = %conn.id(), "connected to relay server");
        Ok(Self { actor, hub, config })
    }

    /// The client side of the connection.
    pub fn connection(&self) -> &Arc<Connection> {
        self.actor.connection()
    }

    /// The client's handler hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Resolved configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queue an encoded frame for the server.
    pub async fn send_message(&self, frame: Bytes) -> std::result::Result<(), ConnectionError> {
        self.connection().send_message(frame).await
    }

    /// Flush queued frames, then close with a normal close frame.
    pub fn finish(&self) {
        self.connection().finish();
    }

    /// Close immediately, dropping anything still queued.
    pub fn close(&self) {
        self.connection().close();
    }

    /// Whether both duties have ended.
    pub fn is_closed(&self) -> bool {
        self.actor.is_finished()
    }

    /// Wait for the connection to end, then drain the client hub.
    pub async fn run_until_closed(self) {
        let id = self.connection().id().to_owned();
        self.actor.join().await;
        if !self.hub.shutdown(self.config.drain_timeout).await {
            warn!(connection_id = %id, "client hub did not drain in time");
        }
        info!(connection_id = %id, "client stopped");
    }
}
