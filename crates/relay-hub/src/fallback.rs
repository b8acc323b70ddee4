//! The `ERR` route: answers frames nobody else handles.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use relay_core::codec::encode_json;
use relay_core::{ErrorBody, MessageKind};
use tracing::{debug, error, warn};

use crate::connection::Connection;
use crate::handler::{MessageContext, MessageHandler};

/// Replies `{"code":NO_MSGTYPE,"message":"no such message type"}` as an
/// `ERR` frame on the originating connection.
///
/// The hub installs this on the `ERR` route unless the embedding side
/// registers its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSuchKindHandler;

#[async_trait]
impl MessageHandler for NoSuchKindHandler {
    async fn handle(&self, ctx: &MessageContext, conn: Arc<Connection>, kind: MessageKind, _payload: Bytes) {
        warn!(connection_id = %ctx.connection_id, %kind, "no handler for message kind");

        let frame = match encode_json(MessageKind::ERR, &ErrorBody::no_such_message_type()) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to encode error reply");
                return;
            }
        };
        if let Err(e) = conn.send_message(frame).await {
            debug!(connection_id = %ctx.connection_id, error = %e, "could not deliver error reply");
        }
    }
}
