//! `JOIN`: a peer announces who it is.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use relay_core::codec::decode_meta;
use relay_core::{JoinRequest, MessageKind};
use relay_hub::{Connection, MessageContext, MessageHandler};
use tracing::{error, info};

/// Decodes the join request and records it. Sends no reply.
#[derive(Clone, Copy, Debug, Default)]
pub struct JoinHandler;

#[async_trait]
impl MessageHandler for JoinHandler {
    async fn handle(&self, ctx: &MessageContext, _conn: Arc<Connection>, _kind: MessageKind, payload: Bytes) {
        match decode_meta::<JoinRequest>(&payload) {
            Ok(request) => info!(
                connection_id = %ctx.connection_id,
                joined_as = %request.id,
                has_secret = request.secret_key.is_some(),
                "peer joined"
            ),
            Err(e) => error!(connection_id = %ctx.connection_id, error = %e, "malformed join payload"),
        }
    }
}
