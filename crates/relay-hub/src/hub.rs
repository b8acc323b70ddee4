//! Kind-keyed handler hub.
//!
//! Each registered kind owns a bounded FIFO queue and exactly one worker
//! task. The worker runs the kind's handler for one message at a time in
//! enqueue order, so messages of one kind are processed in arrival order
//! across every connection, while different kinds run concurrently.
//!
//! Handlers are registered on a [`HubBuilder`]; [`HubBuilder::build`]
//! starts the workers and freezes the routing table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, histogram};
use parking_lot::Mutex;
use relay_core::{MessageKind, safe_run};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::connection::Connection;
use crate::errors::HubError;
use crate::fallback::NoSuchKindHandler;
use crate::handler::{MessageContext, MessageHandler};
use crate::metrics as names;

/// Queue depth used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

struct Job {
    ctx: MessageContext,
    conn: Arc<Connection>,
    kind: MessageKind,
    payload: Bytes,
}

/// Collects handler registrations before the hub starts.
pub struct HubBuilder {
    queue_capacity: usize,
    handlers: HashMap<MessageKind, Arc<dyn MessageHandler>>,
    err_overridden: bool,
}

impl HubBuilder {
    /// Start a builder whose `ERR` route is the built-in
    /// [`NoSuchKindHandler`].
    pub fn new(queue_capacity: usize) -> Self {
        let mut handlers: HashMap<MessageKind, Arc<dyn MessageHandler>> = HashMap::new();
        let _ = handlers.insert(MessageKind::ERR, Arc::new(NoSuchKindHandler));
        Self {
            queue_capacity: queue_capacity.max(1),
            handlers,
            err_overridden: false,
        }
    }

    /// Bind `handler` to `kind`, replacing any earlier binding.
    pub fn register(&mut self, kind: MessageKind, handler: impl MessageHandler) -> &mut Self {
        let replaced = self.handlers.insert(kind, Arc::new(handler)).is_some();
        if kind.is_err() && !self.err_overridden {
            self.err_overridden = true;
            debug!("ERR route overridden");
        } else if replaced {
            warn!(%kind, "handler replaced an earlier registration");
        }
        self
    }

    /// Whether `kind` has a binding.
    pub fn has_handler(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Start one worker per kind on the current runtime.
    pub fn build(self) -> Result<Hub, HubError> {
        let runtime = Handle::try_current().map_err(|_| HubError::NoRuntime)?;
        let cancel = CancellationToken::new();
        let mut routes = HashMap::with_capacity(self.handlers.len());
        let mut workers = Vec::with_capacity(self.handlers.len());

        for (kind, handler) in self.handlers {
            let (tx, rx) = mpsc::channel(self.queue_capacity);
            let span = info_span!("kind_worker", %kind);
            let worker = runtime.spawn(run_worker(kind, handler, rx, cancel.clone()).instrument(span));
            let _ = routes.insert(kind, tx);
            workers.push(worker);
        }

        info!(kinds = routes.len(), queue_capacity = self.queue_capacity, "handler hub started");
        Ok(Hub {
            routes,
            cancel,
            queue_capacity: self.queue_capacity,
            workers: Mutex::new(workers),
        })
    }
}

/// Running hub: routing table plus its workers.
pub struct Hub {
    routes: HashMap<MessageKind, mpsc::Sender<Job>>,
    cancel: CancellationToken,
    queue_capacity: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Hub {
    /// Start a [`HubBuilder`].
    pub fn builder(queue_capacity: usize) -> HubBuilder {
        HubBuilder::new(queue_capacity)
    }

    /// Context for a frame that just arrived on `connection_id`.
    pub fn context(&self, connection_id: impl Into<String>) -> MessageContext {
        MessageContext::new(connection_id, self.cancel.child_token())
    }

    /// Enqueue a message on its kind's queue, waiting while the queue is full.
    ///
    /// A kind without a handler is enqueued on the `ERR` route so the peer
    /// still gets an answer, and [`HubError::NoHandler`] is returned.
    pub async fn dispatch(
        &self,
        ctx: MessageContext,
        conn: Arc<Connection>,
        kind: MessageKind,
        payload: Bytes,
    ) -> Result<(), HubError> {
        if self.cancel.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }

        let (route, outcome) = match self.routes.get(&kind) {
            Some(_) => (kind, Ok(())),
            None => {
                counter!(names::DISPATCH_ERRORS_TOTAL, "error_type" => "no_handler").increment(1);
                (MessageKind::ERR, Err(HubError::NoHandler { kind }))
            }
        };
        let Some(tx) = self.routes.get(&route) else {
            return Err(HubError::NoHandler { kind });
        };

        let job = Job {
            ctx,
            conn,
            kind,
            payload,
        };
        if tx.send(job).await.is_err() {
            counter!(names::DISPATCH_ERRORS_TOTAL, "error_type" => "worker_stopped").increment(1);
            return Err(if self.cancel.is_cancelled() {
                HubError::ShuttingDown
            } else {
                HubError::WorkerStopped { kind: route }
            });
        }
        outcome
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<MessageKind> {
        let mut kinds: Vec<_> = self.routes.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Whether `kind` has a dedicated handler.
    pub fn has_handler(&self, kind: MessageKind) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Per-kind queue bound.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Whether [`Hub::shutdown`] has started.
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop accepting dispatches and let every worker finish what is
    /// already queued.
    ///
    /// Returns `false` if the workers did not drain within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return true;
        }

        match tokio::time::timeout(timeout, futures::future::join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "kind worker ended abnormally");
                    }
                }
                info!("handler hub drained");
                true
            }
            Err(_) => {
                warn!(?timeout, "handler hub drain timed out");
                false
            }
        }
    }
}

async fn run_worker(
    kind: MessageKind,
    handler: Arc<dyn MessageHandler>,
    mut rx: mpsc::Receiver<Job>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            job = rx.recv() => match job {
                Some(job) => run_job(handler.as_ref(), job).await,
                None => return,
            },
            () = cancel.cancelled() => break,
        }
    }

    // Refuse new jobs, finish the queued ones.
    rx.close();
    let mut drained = 0usize;
    while let Some(job) = rx.recv().await {
        run_job(handler.as_ref(), job).await;
        drained += 1;
    }
    debug!(%kind, drained, "kind worker stopped");
}

async fn run_job(handler: &dyn MessageHandler, job: Job) {
    let Job {
        ctx,
        conn,
        kind,
        payload,
    } = job;
    let started = tokio::time::Instant::now();
    if let Err(e) = safe_run(handler.handle(&ctx, conn, kind, payload)).await {
        error!(connection_id = %ctx.connection_id, %kind, error = %e, "handler panicked");
    }
    histogram!(names::HANDLER_DURATION_SECONDS, "kind" => kind.to_string())
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionConfig, Mailbox, Side};
    use crate::handler::handler_fn;
    use assert_matches::assert_matches;
    use relay_core::codec::decode_kind;
    use relay_core::{ErrorBody, codec::decode_meta};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn conn(id: &str) -> (Arc<Connection>, Mailbox) {
        Connection::new(id, Side::Server, ConnectionConfig::default())
    }

    #[test]
    fn build_outside_runtime_fails() {
        let result = HubBuilder::new(4).build().map(|_| ());
        assert_matches!(result, Err(HubError::NoRuntime));
    }

    #[tokio::test]
    async fn err_route_always_present() {
        let hub = HubBuilder::new(4).build().unwrap();
        assert_eq!(hub.kinds(), vec![MessageKind::ERR]);
        assert!(hub.has_handler(MessageKind::ERR));
    }

    #[tokio::test]
    async fn unknown_kind_replies_no_msgtype() {
        let hub = HubBuilder::new(4).build().unwrap();
        let (c, mut mailbox) = conn("c1");

        let result = hub
            .dispatch(hub.context("c1"), Arc::clone(&c), MessageKind(0xFFFF), Bytes::new())
            .await;
        assert_matches!(result, Err(HubError::NoHandler { kind }) if kind == MessageKind(0xFFFF));

        let frame = mailbox.recv_outbound().await.unwrap();
        let (kind, body) = decode_kind(&frame);
        assert_eq!(kind, MessageKind::ERR);
        let body: ErrorBody = decode_meta(&body).unwrap();
        assert_eq!(body, ErrorBody::no_such_message_type());
    }

    #[tokio::test]
    async fn same_kind_is_fifo_across_connections() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        let mut builder = HubBuilder::new(64);
        {
            let order = Arc::clone(&order);
            let counter = Arc::clone(&counter);
            let _ = builder.register(
                MessageKind(7),
                handler_fn(move |ctx, _conn, _kind, payload| {
                    let order = Arc::clone(&order);
                    let counter = Arc::clone(&counter);
                    async move {
                        let seq = counter.fetch_add(1, Ordering::SeqCst);
                        order.lock().push((seq, ctx.connection_id, payload[0]));
                        tokio::task::yield_now().await;
                    }
                }),
            );
        }
        let hub = builder.build().unwrap();
        let (a, _ma) = conn("a");
        let (b, _mb) = conn("b");

        for i in 0..20u8 {
            let (id, c) = if i % 2 == 0 { ("a", &a) } else { ("b", &b) };
            hub.dispatch(hub.context(id), Arc::clone(c), MessageKind(7), Bytes::from(vec![i]))
                .await
                .unwrap();
        }
        assert!(hub.shutdown(Duration::from_secs(5)).await);

        let order = order.lock();
        assert_eq!(order.len(), 20);
        for (i, (seq, id, byte)) in order.iter().enumerate() {
            assert_eq!(*seq, i);
            assert_eq!(usize::from(*byte), i);
            assert_eq!(id, if i % 2 == 0 { "a" } else { "b" });
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_senders_keep_their_order_through_a_full_queue() {
        const SENDERS: u8 = 4;
        const PER_SENDER: u8 = 25;

        let (open_tx, open_rx) = tokio::sync::watch::channel(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut builder = HubBuilder::new(2);
        {
            let seen = Arc::clone(&seen);
            let _ = builder.register(
                MessageKind(7),
                handler_fn(move |ctx, _conn, _kind, payload| {
                    let seen = Arc::clone(&seen);
                    let mut open = open_rx.clone();
                    async move {
                        let _ = open.wait_for(|open| *open).await;
                        seen.lock().push((ctx.connection_id, payload[0]));
                        tokio::task::yield_now().await;
                    }
                }),
            );
        }
        let hub = Arc::new(builder.build().unwrap());

        let senders: Vec<_> = (0..SENDERS)
            .map(|s| {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    let id = format!("c{s}");
                    let (c, _m) = conn(&id);
                    for seq in 0..PER_SENDER {
                        hub.dispatch(hub.context(id.as_str()), Arc::clone(&c), MessageKind(7), Bytes::from(vec![seq]))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();

        // The worker is parked on the first job and the queue holds two more.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(senders.iter().all(|s| !s.is_finished()), "senders should wait on the full queue");

        open_tx.send(true).unwrap();
        for sender in senders {
            sender.await.unwrap();
        }
        assert!(hub.shutdown(Duration::from_secs(5)).await);

        let seen = seen.lock();
        assert_eq!(seen.len(), usize::from(SENDERS) * usize::from(PER_SENDER));
        for s in 0..SENDERS {
            let id = format!("c{s}");
            let seqs: Vec<u8> = seen.iter().filter(|(c, _)| *c == id).map(|(_, seq)| *seq).collect();
            assert_eq!(seqs, (0..PER_SENDER).collect::<Vec<_>>(), "{id} out of order");
        }
    }

    #[tokio::test]
    async fn register_replaces_earlier_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut builder = HubBuilder::new(4);
        let _ = builder.register(MessageKind(3), handler_fn(|_, _, _, _| async {
            panic!("replaced handler must not run");
        }));
        {
            let hits = Arc::clone(&hits);
            let _ = builder.register(
                MessageKind(3),
                handler_fn(move |_, _, _, _| {
                    let hits = Arc::clone(&hits);
                    async move {
                        let _ = hits.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }
        let hub = builder.build().unwrap();
        let (c, _m) = conn("c");
        hub.dispatch(hub.context("c"), c, MessageKind(3), Bytes::new()).await.unwrap();
        assert!(hub.shutdown(Duration::from_secs(1)).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_panic_does_not_kill_worker() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut builder = HubBuilder::new(4);
        {
            let hits = Arc::clone(&hits);
            let _ = builder.register(
                MessageKind(5),
                handler_fn(move |_, _, _, payload| {
                    let hits = Arc::clone(&hits);
                    async move {
                        assert!(!payload.is_empty(), "empty payload");
                        let _ = hits.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            );
        }
        let hub = builder.build().unwrap();
        let (c, _m) = conn("c");
        hub.dispatch(hub.context("c"), Arc::clone(&c), MessageKind(5), Bytes::new()).await.unwrap();
        hub.dispatch(hub.context("c"), c, MessageKind(5), Bytes::from_static(b"x")).await.unwrap();
        assert!(hub.shutdown(Duration::from_secs(1)).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_is_refused() {
        let hub = HubBuilder::new(4).build().unwrap();
        assert!(hub.shutdown(Duration::from_secs(1)).await);
        assert!(hub.is_shutting_down());
        let (c, _m) = conn("c");
        let result = hub.dispatch(hub.context("c"), c, MessageKind::ERR, Bytes::new()).await;
        assert_matches!(result, Err(HubError::ShuttingDown));
    }

    #[tokio::test]
    async fn full_queue_applies_backpressure() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut builder = HubBuilder::new(1);
        {
            let gate = Arc::clone(&gate);
            let _ = builder.register(
                MessageKind(9),
                handler_fn(move |_, _, _, _| {
                    let gate = Arc::clone(&gate);
                    async move {
                        if let Ok(permit) = gate.acquire().await {
                            permit.forget();
                        }
                    }
                }),
            );
        }
        let hub = Arc::new(builder.build().unwrap());
        let (c, _m) = conn("c");

        // The worker takes the first job and parks on the gate; the second fills the queue.
        for _ in 0..2 {
            hub.dispatch(hub.context("c"), Arc::clone(&c), MessageKind(9), Bytes::new())
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }

        let third = {
            let hub = Arc::clone(&hub);
            let c = Arc::clone(&c);
            tokio::spawn(async move { hub.dispatch(hub.context("c"), c, MessageKind(9), Bytes::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!third.is_finished(), "dispatch should wait for queue space");

        gate.add_permits(1);
        third.await.unwrap().unwrap();
        gate.add_permits(2);
        assert!(hub.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn context_cancel_follows_shutdown() {
        let hub = HubBuilder::new(1).build().unwrap();
        let ctx = hub.context("c");
        assert!(!ctx.cancel.is_cancelled());
        assert!(hub.shutdown(Duration::from_secs(1)).await);
        assert!(ctx.cancel.is_cancelled());
    }
}
