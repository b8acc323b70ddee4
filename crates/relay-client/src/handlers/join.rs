//! `JOIN` acknowledgments and the join request helper.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use relay_core::codec::{decode_meta, encode_json};
use relay_core::{JoinAck, JoinRequest, MessageKind};
use relay_hub::{Connection, MessageContext, MessageHandler};
use tracing::{error, info, warn};

use crate::errors::Result;

/// Records the server's answer to a join request.
#[derive(Clone, Copy, Debug, Default)]
pub struct JoinAckHandler;

#[async_trait]
impl MessageHandler for JoinAckHandler {
    async fn handle(&self, ctx: &MessageContext, _conn: Arc<Connection>, _kind: MessageKind, payload: Bytes) {
        match decode_meta::<JoinAck>(&payload) {
            Ok(JoinAck { succ: true }) => info!(connection_id = %ctx.connection_id, "join acknowledged"),
            Ok(JoinAck { succ: false }) => warn!(connection_id = %ctx.connection_id, "join refused"),
            Err(e) => error!(connection_id = %ctx.connection_id, error = %e, "malformed join ack"),
        }
    }
}

/// Announce `id` (and optionally a secret) to the server.
pub async fn send_join(conn: &Connection, id: &str, secret_key: Option<&str>) -> Result<()> {
    let mut request = JoinRequest::new(id);
    if let Some(secret) = secret_key {
        request = request.with_secret(secret);
    }
    let frame = encode_json(MessageKind::JOIN, &request)?;
    conn.send_message(frame).await?;
    info!(connection_id = %conn.id(), joined_as = %id, "join sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use assert_matches::assert_matches;
    use relay_core::codec::{decode_kind, encode_meta};
    use relay_core::logging::capture_logs;
    use relay_hub::{ConnectionConfig, Side};
    use tokio_util::sync::CancellationToken;
    use tracing::Level;

    async fn handle(payload: Bytes) -> relay_core::logging::CapturedLogs {
        let (logs, _guard) = capture_logs();
        let (conn, mut mailbox) = Connection::new("c1", Side::Client, ConnectionConfig::default());
        let ctx = MessageContext::new("c1", CancellationToken::new());
        JoinAckHandler.handle(&ctx, conn, MessageKind::JOIN, payload).await;
        assert!(mailbox.try_recv_outbound().is_none());
        logs
    }

    #[tokio::test]
    async fn accepted_ack_is_logged() {
        let logs = handle(encode_meta(&JoinAck { succ: true }).unwrap()).await;
        assert!(logs.has_event(Level::INFO, "join acknowledged"));
    }

    #[tokio::test]
    async fn refused_ack_is_a_warning() {
        let logs = handle(encode_meta(&JoinAck { succ: false }).unwrap()).await;
        assert!(logs.has_event(Level::WARN, "join refused"));
    }

    #[tokio::test]
    async fn malformed_ack_is_an_error() {
        let logs = handle(Bytes::from_static(b"\x00\x00\x00\x02[]")).await;
        assert!(logs.has_event(Level::ERROR, "malformed join ack"));
    }

    #[tokio::test]
    async fn send_join_queues_request() {
        let (conn, mut mailbox) = Connection::new("c1", Side::Client, ConnectionConfig::default());
        send_join(&conn, "u1", Some("k")).await.unwrap();

        let frame = mailbox.try_recv_outbound().unwrap();
        assert_eq!(frame, encode_json(MessageKind::JOIN, &JoinRequest::new("u1").with_secret("k")).unwrap());
        let (kind, payload) = decode_kind(&frame);
        assert_eq!(kind, MessageKind::JOIN);
        let request: JoinRequest = decode_meta(&payload).unwrap();
        assert_eq!(request.id, "u1");
        assert_eq!(request.secret_key.as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn send_join_on_closed_connection_fails() {
        let (conn, _mailbox) = Connection::new("c1", Side::Client, ConnectionConfig::default());
        conn.close();
        assert_matches!(send_join(&conn, "u1", None).await, Err(ClientError::Connection(_)));
    }
}
