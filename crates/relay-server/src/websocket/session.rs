//! One accepted socket, from upgrade to the end of its actor.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::SinkExt;
use metrics::counter;
use relay_core::Deferred;
use relay_hub::metrics as names;
use relay_hub::{CloseInfo, Connection, ConnectionActor, RegistryError, Side};
use tracing::{debug, info, warn};

use super::adapter;
use crate::server::AppState;

/// Close reason sent to a rejected duplicate.
pub const DUPLICATE_REASON: &str = "duplicate connection id";

/// Close reason sent to a connection displaced by a newer one.
pub const REPLACED_REASON: &str = "replaced by a newer connection";

/// Register the socket under `id` and run its actor until both duties end.
///
/// A taken id either rejects the newcomer (close frame after the reject
/// grace, never registered) or, with `replace_duplicate_ids`, retires the
/// registered connection and takes its place.
pub async fn run_session(socket: WebSocket, id: String, state: AppState) {
    let (conn, mailbox) = Connection::new(id, Side::Server, state.config.connection.clone());

    match state.registry.register(&conn) {
        Ok(()) => {}
        Err(RegistryError::Duplicate { id }) if state.config.replace_duplicate_ids => {
            if let Some(stale) = state.registry.reset(&conn) {
                counter!(names::CONNECTIONS_REPLACED_TOTAL).increment(1);
                info!(connection_id = %id, stale_serial = stale.serial(), "replacing connection");
                if let Err(e) = stale.last_message(CloseInfo::new(CloseInfo::POLICY, REPLACED_REASON)) {
                    debug!(connection_id = %id, error = %e, "stale connection already closing");
                }
            }
        }
        Err(RegistryError::Duplicate { id }) => {
            counter!(names::UPGRADES_REFUSED_TOTAL, "reason" => "duplicate_id").increment(1);
            reject_duplicate(socket, id, &state).await;
            return;
        }
    }

    let (sink, stream) = adapter::split(socket);
    let actor = ConnectionActor::spawn(conn, mailbox, sink, stream, state.inbound.clone());
    actor.join().await;
}

async fn reject_duplicate(mut socket: WebSocket, id: String, state: &AppState) {
    warn!(connection_id = %id, grace = ?state.config.reject_grace, "rejecting duplicate connection");
    let rejected = Deferred::new(state.config.reject_grace).schedule_once("reject_duplicate", async move {
        let frame = CloseFrame {
            code: CloseInfo::POLICY,
            reason: DUPLICATE_REASON.into(),
        };
        if let Err(e) = socket.send(Message::Close(Some(frame))).await {
            debug!(connection_id = %id, error = %e, "duplicate already gone");
        }
        if let Err(e) = socket.close().await {
            debug!(connection_id = %id, error = %e, "duplicate socket close failed");
        }
    });
    let _ = rejected.await;
}
