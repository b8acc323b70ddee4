//! Handler trait and per-message context.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use relay_core::MessageKind;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;

/// Context handed to every handler invocation.
#[derive(Clone, Debug)]
pub struct MessageContext {
    /// Id of the connection the frame arrived on.
    pub connection_id: String,
    /// When the read duty handed the frame to the hub.
    pub received_at: Instant,
    /// Fires when the hub starts shutting down; long-running handlers
    /// should stop early.
    pub cancel: CancellationToken,
}

impl MessageContext {
    /// Context stamped with the current time.
    pub fn new(connection_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            connection_id: connection_id.into(),
            received_at: Instant::now(),
            cancel,
        }
    }
}

/// Business logic for one message kind.
///
/// A kind's handler runs on that kind's worker, one message at a time,
/// in queue order. The payload is everything after the kind tag.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one message.
    async fn handle(&self, ctx: &MessageContext, conn: Arc<Connection>, kind: MessageKind, payload: Bytes);
}

/// Adapter returned by [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`MessageHandler`].
///
/// ```ignore
/// builder.register(MessageKind(7), handler_fn(|_ctx, conn, _kind, payload| async move {
///     let _ = conn.send_message(payload).await;
/// }));
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(MessageContext, Arc<Connection>, MessageKind, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(MessageContext, Arc<Connection>, MessageKind, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, ctx: &MessageContext, conn: Arc<Connection>, kind: MessageKind, payload: Bytes) {
        (self.f)(ctx.clone(), conn, kind, payload).await;
    }
}
