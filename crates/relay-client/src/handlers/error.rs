//! The client's `ERR` route.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use relay_core::codec::decode_meta;
use relay_core::{ErrorBody, MessageKind};
use relay_hub::{Connection, MessageContext, MessageHandler};
use tracing::{error, warn};

/// Logs error reports from the server and never answers them.
///
/// Also catches admitted kinds without a handler; those are logged and
/// dropped so two peers cannot bounce error frames back and forth.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerErrorHandler;

#[async_trait]
impl MessageHandler for ServerErrorHandler {
    async fn handle(&self, ctx: &MessageContext, _conn: Arc<Connection>, kind: MessageKind, payload: Bytes) {
        if !kind.is_err() {
            warn!(connection_id = %ctx.connection_id, %kind, "no handler for message kind");
            return;
        }
        match decode_meta::<ErrorBody>(&payload) {
            Ok(report) => warn!(
                connection_id = %ctx.connection_id,
                code = report.code,
                report_message = %report.message,
                "server reported an error"
            ),
            Err(e) => error!(connection_id = %ctx.connection_id, error = %e, "malformed error report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::codec::encode_meta;
    use relay_core::logging::{CapturedLogs, capture_logs};
    use relay_hub::{ConnectionConfig, Side};
    use tokio_util::sync::CancellationToken;
    use tracing::Level;

    async fn handle(kind: MessageKind, payload: Bytes) -> CapturedLogs {
        let (logs, _guard) = capture_logs();
        let (conn, mut mailbox) = Connection::new("c1", Side::Client, ConnectionConfig::default());
        let ctx = MessageContext::new("c1", CancellationToken::new());
        ServerErrorHandler.handle(&ctx, conn, kind, payload).await;
        assert!(mailbox.try_recv_outbound().is_none(), "error reports are never answered");
        logs
    }

    #[tokio::test]
    async fn report_fields_are_logged() {
        let payload = encode_meta(&ErrorBody::no_such_message_type()).unwrap();
        let logs = handle(MessageKind::ERR, payload).await;
        let reports = logs.matching(Level::WARN, "server reported an error");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].field("code"), Some("4001"));
        assert_eq!(reports[0].field("report_message"), Some("no such message type"));
    }

    #[tokio::test]
    async fn malformed_report_is_an_error() {
        let logs = handle(MessageKind::ERR, Bytes::from_static(b"\x00\x00")).await;
        assert!(logs.has_event(Level::ERROR, "malformed error report"));
    }

    #[tokio::test]
    async fn unhandled_kind_is_dropped_quietly() {
        let logs = handle(MessageKind(77), Bytes::new()).await;
        assert!(logs.has_event(Level::WARN, "no handler for message kind"));
        assert!(!logs.has_event(Level::WARN, "server reported an error"));
    }
}
