//! The two duties that drive a connection.
//!
//! The read duty pulls frames off the socket and hands each to the hub on
//! its own task, bounded by the connection's in-flight permits. The write
//! duty owns the socket's write half: it drains the outbound queue, sends
//! pings, and watches the heartbeat. Either duty ending closes the
//! connection, which stops the other.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, gauge};
use relay_core::codec::decode_kind;
use relay_core::safe_run;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{Connection, Mailbox};
use crate::errors::{HubError, TransportError};
use crate::hub::Hub;
use crate::metrics as names;
use crate::policy::PeerPolicy;
use crate::transport::{CloseInfo, FrameSink, FrameStream, WireMessage};

/// Where inbound frames go: the peer policy gate, then the hub.
#[derive(Clone)]
pub struct Inbound {
    /// Handler hub.
    pub hub: Arc<Hub>,
    /// Kinds the peer may send.
    pub policy: Arc<PeerPolicy>,
}

impl Inbound {
    /// Bundle a hub and a policy.
    pub fn new(hub: Arc<Hub>, policy: Arc<PeerPolicy>) -> Self {
        Self { hub, policy }
    }

    /// Route one raw frame: decode the kind, apply the policy, dispatch.
    ///
    /// Disallowed kinds are dropped without a reply.
    pub async fn handle_frame(&self, conn: Arc<Connection>, data: Bytes) {
        let (kind, payload) = decode_kind(&data);
        if !self.policy.is_allowed_from_peer(kind) {
            counter!(names::DISALLOWED_KINDS_TOTAL, "side" => conn.side().as_str()).increment(1);
            warn!(connection_id = %conn.id(), %kind, "kind not allowed from peer, dropped");
            return;
        }

        let ctx = self.hub.context(conn.id());
        match self.hub.dispatch(ctx, conn, kind, payload).await {
            Ok(()) => {}
            Err(HubError::NoHandler { kind }) => debug!(%kind, "routed to ERR fallback"),
            Err(e) => warn!(%kind, error = %e, "dispatch failed"),
        }
    }
}

/// Starts the duties for a connection.
pub struct ConnectionActor;

impl ConnectionActor {
    /// Spawn the read duty, the write duty, and a supervisor that marks
    /// the connection closed once both ended.
    pub fn spawn<S, R>(conn: Arc<Connection>, mailbox: Mailbox, sink: S, stream: R, inbound: Inbound) -> ActorHandle
    where
        S: FrameSink,
        R: FrameStream,
    {
        let side = conn.side();
        counter!(names::CONNECTIONS_OPENED_TOTAL, "side" => side.as_str()).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE, "side" => side.as_str()).increment(1.0);
        info!(connection_id = %conn.id(), %side, "connection open");

        let read = tokio::spawn(
            read_duty(Arc::clone(&conn), stream, inbound)
                .instrument(info_span!("read_duty", connection_id = %conn.id(), %side)),
        );
        let write = tokio::spawn(
            write_duty(Arc::clone(&conn), mailbox, sink)
                .instrument(info_span!("write_duty", connection_id = %conn.id(), %side)),
        );

        let supervised = Arc::clone(&conn);
        let supervisor = tokio::spawn(async move {
            let _ = tokio::join!(
                supervise(&supervised, "read", read),
                supervise(&supervised, "write", write),
            );
            supervised.mark_closed();
            counter!(names::CONNECTIONS_CLOSED_TOTAL, "side" => side.as_str()).increment(1);
            gauge!(names::CONNECTIONS_ACTIVE, "side" => side.as_str()).decrement(1.0);
            info!(
                connection_id = %supervised.id(),
                %side,
                age_secs = supervised.age().as_secs_f64(),
                "connection closed"
            );
        });

        ActorHandle { conn, supervisor }
    }
}

/// Handle on a running connection actor.
pub struct ActorHandle {
    conn: Arc<Connection>,
    supervisor: JoinHandle<()>,
}

impl ActorHandle {
    /// The connection this actor drives.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Whether both duties have ended.
    pub fn is_finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    /// Wait until both duties have ended.
    pub async fn join(self) {
        if let Err(e) = self.supervisor.await {
            error!(connection_id = %self.conn.id(), error = %e, "connection supervisor failed");
        }
    }
}

async fn supervise(conn: &Connection, duty: &'static str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(connection_id = %conn.id(), duty, error = %e, "duty task failed");
        conn.close();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read duty
// ─────────────────────────────────────────────────────────────────────────────

async fn read_duty<R: FrameStream>(conn: Arc<Connection>, mut stream: R, inbound: Inbound) {
    let read_timeout = conn.config().read_timeout;
    let read_limit = conn.config().read_limit;

    loop {
        let next = tokio::select! {
            biased;
            () = conn.close_token().cancelled() => break,
            next = tokio::time::timeout(read_timeout, stream.recv()) => next,
        };

        let message = match next {
            Err(_) => {
                error!(timeout = ?read_timeout, "read timed out, dropping idle peer");
                break;
            }
            Ok(None) => {
                warn!("peer went away");
                break;
            }
            Ok(Some(Err(e))) if e.is_expected_close() => {
                warn!(error = %e, "connection closed by peer");
                break;
            }
            Ok(Some(Err(e))) => {
                error!(error = %e, "read failed");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let data = match message {
            WireMessage::Binary(data) => data,
            WireMessage::Text(text) => Bytes::from(text),
            WireMessage::Ping(_) => continue,
            WireMessage::Pong(_) => {
                conn.mark_alive();
                continue;
            }
            WireMessage::Close(info) => {
                log_peer_close(info.as_ref());
                break;
            }
        };

        if data.len() > read_limit {
            error!(len = data.len(), limit = read_limit, "frame exceeds read limit");
            break;
        }
        counter!(names::MESSAGES_RECEIVED_TOTAL, "side" => conn.side().as_str()).increment(1);

        let permit = tokio::select! {
            biased;
            () = conn.close_token().cancelled() => break,
            permit = Arc::clone(conn.inflight()).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let task_conn = Arc::clone(&conn);
        let inbound = inbound.clone();
        let _ = tokio::spawn(
            async move {
                let _permit = permit;
                if let Err(e) = safe_run(inbound.handle_frame(task_conn, data)).await {
                    error!(error = %e, "dispatch panicked");
                }
            }
            .in_current_span(),
        );
    }

    conn.close();
}

fn log_peer_close(info: Option<&CloseInfo>) {
    match info {
        Some(info) if !info.is_expected() => {
            error!(code = info.code, reason = %info.reason, "peer closed connection with error status");
        }
        Some(info) => warn!(code = info.code, reason = %info.reason, "peer closed connection"),
        None => warn!("peer closed connection"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Write duty
// ─────────────────────────────────────────────────────────────────────────────

async fn write_duty<S: FrameSink>(conn: Arc<Connection>, mut mailbox: Mailbox, mut sink: S) {
    let config = conn.config().clone();
    let side = conn.side().as_str();
    let now = Instant::now();

    let ping_period = config.ping_interval.max(Duration::from_millis(1));
    let mut ping = interval_at(now + ping_period, ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let check_period = config.heartbeat_check_interval.max(Duration::from_millis(1));
    let mut heartbeat = interval_at(now + check_period, check_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Once the final close frame is out, only the close signal and the
    // heartbeat are left to end the duty.
    let mut farewell_sent = false;

    loop {
        tokio::select! {
            biased;
            () = conn.close_token().cancelled() => break,
            Some(info) = mailbox.control.recv(), if !farewell_sent => {
                farewell_sent = true;
                if let Err(e) = send_with_deadline(&mut sink, WireMessage::Close(Some(info)), config.write_timeout, "close").await {
                    log_write_error(&e);
                    break;
                }
            }
            frame = mailbox.outbound.recv(), if !farewell_sent => match frame {
                Some(frame) => {
                    if let Err(e) = send_with_deadline(&mut sink, WireMessage::Binary(frame), config.write_timeout, "write").await {
                        log_write_error(&e);
                        break;
                    }
                    counter!(names::FRAMES_WRITTEN_TOTAL, "side" => side).increment(1);
                }
                None => {
                    let bye = WireMessage::Close(Some(CloseInfo::normal("closing")));
                    if let Err(e) = send_with_deadline(&mut sink, bye, config.write_timeout, "close").await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    break;
                }
            },
            _ = ping.tick(), if !farewell_sent => {
                let ping = WireMessage::Ping(Bytes::new());
                if let Err(e) = send_with_deadline(&mut sink, ping, config.ping_write_timeout, "ping").await {
                    log_write_error(&e);
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let silent = conn.last_heartbeat().elapsed();
                if silent > config.heartbeat_timeout {
                    warn!(silent_secs = silent.as_secs(), "peer heartbeat expired, closing");
                    break;
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "socket close failed");
    }
    conn.close();
}

async fn send_with_deadline<S: FrameSink>(
    sink: &mut S,
    message: WireMessage,
    deadline: Duration,
    op: &'static str,
) -> Result<(), TransportError> {
    tokio::time::timeout(deadline, sink.send(message))
        .await
        .map_err(|_| TransportError::Timeout { op, after: deadline })?
}

fn log_write_error(error: &TransportError) {
    if error.is_expected_close() {
        warn!(error = %error, "write failed, peer already closed");
    } else {
        error!(error = %error, "write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, ConnectionState, Side};
    use crate::handler::handler_fn;
    use crate::hub::HubBuilder;
    use crate::transport::memory::{self, MemorySink, MemoryStream};
    use assert_matches::assert_matches;
    use bytes::{BufMut, BytesMut};
    use relay_core::MessageKind;
    use relay_core::codec::{encode, encode_nil};
    use relay_core::logging::capture_logs;
    use tracing::Level;

    struct Harness {
        conn: Arc<Connection>,
        actor: ActorHandle,
        peer_sink: MemorySink,
        peer_stream: MemoryStream,
    }

    fn quiet_config() -> ConnectionConfig {
        ConnectionConfig {
            read_timeout: Duration::from_secs(3600),
            ..ConnectionConfig::default()
        }
    }

    fn echo_hub() -> Arc<Hub> {
        let mut builder = HubBuilder::new(8);
        let _ = builder.register(
            MessageKind(7),
            // `payload` still carries its length prefix; only the tag goes back on.
            handler_fn(|_ctx, conn, kind, payload| async move {
                let mut frame = BytesMut::with_capacity(2 + payload.len());
                frame.put_u16(kind.value());
                frame.extend_from_slice(&payload);
                let _ = conn.send_message(frame.freeze()).await;
            }),
        );
        Arc::new(builder.build().unwrap())
    }

    fn start(config: ConnectionConfig, hub: Arc<Hub>, policy: PeerPolicy) -> Harness {
        let ((sink, stream), (peer_sink, peer_stream)) = memory::pair();
        let (conn, mailbox) = Connection::new("c1", Side::Server, config);
        let actor = ConnectionActor::spawn(
            Arc::clone(&conn),
            mailbox,
            sink,
            stream,
            Inbound::new(hub, Arc::new(policy)),
        );
        Harness {
            conn,
            actor,
            peer_sink,
            peer_stream,
        }
    }

    async fn next_binary(stream: &mut MemoryStream) -> Option<Bytes> {
        loop {
            match stream.recv().await? {
                Ok(WireMessage::Binary(data)) => return Some(data),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }

    #[tokio::test]
    async fn unknown_kind_gets_exact_error_frame() {
        let mut h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        h.peer_sink
            .send(WireMessage::Binary(encode_nil(MessageKind(0xFFFF))))
            .await
            .unwrap();

        let frame = next_binary(&mut h.peer_stream).await.unwrap();
        let (kind, body) = decode_kind(&frame);
        assert_eq!(kind, MessageKind::ERR);
        assert_eq!(
            std::str::from_utf8(&body[4..]).unwrap(),
            r#"{"code":4001,"message":"no such message type"}"#
        );
        assert_eq!(h.conn.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn registered_kind_round_trips() {
        let mut h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        let frame = encode(MessageKind(7), b"ping me").unwrap();
        h.peer_sink.send(WireMessage::Binary(frame.clone())).await.unwrap();
        assert_eq!(next_binary(&mut h.peer_stream).await.unwrap(), frame);
    }

    #[tokio::test]
    async fn text_frames_are_treated_as_bytes() {
        let mut h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        let frame = encode(MessageKind(7), b"txt").unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        h.peer_sink.send(WireMessage::Text(text)).await.unwrap();
        assert_eq!(next_binary(&mut h.peer_stream).await.unwrap(), frame);
    }

    #[tokio::test(start_paused = true)]
    async fn disallowed_kind_is_dropped_silently() {
        let mut h = start(
            quiet_config(),
            echo_hub(),
            PeerPolicy::allow_list([MessageKind::JOIN]),
        );
        h.peer_sink
            .send(WireMessage::Binary(encode(MessageKind(7), b"x").unwrap()))
            .await
            .unwrap();
        h.peer_sink
            .send(WireMessage::Binary(encode_nil(MessageKind(0xFFFF))))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(1), next_binary(&mut h.peer_stream)).await;
        assert!(reply.is_err(), "no reply expected for disallowed kinds");
        assert_eq!(h.conn.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_closed_by_heartbeat() {
        let h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.conn.state(), ConnectionState::Open, "one missed ping is tolerated");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_ne!(h.conn.state(), ConnectionState::Open);

        h.actor.join().await;
        assert_eq!(h.conn.state(), ConnectionState::Closed);
        drop(h.peer_sink);
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_connection_alive() {
        let Harness {
            conn,
            actor,
            mut peer_sink,
            mut peer_stream,
        } = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());

        let responder = tokio::spawn(async move {
            while let Some(Ok(message)) = peer_stream.recv().await {
                if let WireMessage::Ping(data) = message {
                    if peer_sink.send(WireMessage::Pong(data)).await.is_err() {
                        break;
                    }
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(conn.state(), ConnectionState::Open);

        conn.close();
        actor.join().await;
        responder.abort();
    }

    #[tokio::test]
    async fn normal_peer_close_logs_warn() {
        let (logs, _guard) = capture_logs();
        let mut h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        h.peer_sink
            .send(WireMessage::Close(Some(CloseInfo::normal("done"))))
            .await
            .unwrap();
        h.actor.join().await;

        assert!(logs.has_event(Level::WARN, "peer closed connection"));
        assert!(!logs.has_event(Level::ERROR, "peer closed connection"));
        assert_eq!(h.conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn transport_failure_logs_error() {
        let (logs, _guard) = capture_logs();
        let mut h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        assert!(h.peer_sink.fail(TransportError::Io("connection reset".into())));
        h.actor.join().await;

        assert!(logs.has_event(Level::ERROR, "read failed"));
        assert_eq!(h.conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let (logs, _guard) = capture_logs();
        let config = ConnectionConfig {
            read_limit: 8,
            ..quiet_config()
        };
        let mut h = start(config, echo_hub(), PeerPolicy::allow_all());
        h.peer_sink
            .send(WireMessage::Binary(Bytes::from(vec![0u8; 16])))
            .await
            .unwrap();
        h.actor.join().await;

        assert!(logs.has_event(Level::ERROR, "exceeds read limit"));
    }

    #[tokio::test]
    async fn finish_flushes_then_sends_close_frame() {
        let mut h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        h.conn.send_message(Bytes::from_static(b"one")).await.unwrap();
        h.conn.send_message(Bytes::from_static(b"two")).await.unwrap();
        h.conn.finish();

        let mut seen = Vec::new();
        while let Some(Ok(message)) = h.peer_stream.recv().await {
            seen.push(message);
        }
        assert_eq!(
            seen,
            vec![
                WireMessage::Binary(Bytes::from_static(b"one")),
                WireMessage::Binary(Bytes::from_static(b"two")),
                WireMessage::Close(Some(CloseInfo::normal("closing"))),
            ]
        );
        h.actor.join().await;
        assert_eq!(h.conn.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn last_message_closes_after_grace() {
        let mut h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        h.conn.last_message(CloseInfo::new(CloseInfo::POLICY, "replaced")).unwrap();

        let first = h.peer_stream.recv().await.unwrap().unwrap();
        assert_eq!(first, WireMessage::Close(Some(CloseInfo::new(1008, "replaced"))));
        assert_matches!(h.conn.send_message(Bytes::new()).await, Err(_));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!h.actor.is_finished());

        h.actor.join().await;
        assert_eq!(h.conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn duties_run_in_named_spans() {
        let (logs, _guard) = capture_logs();
        let h = start(quiet_config(), echo_hub(), PeerPolicy::allow_all());
        h.conn.close();
        h.actor.join().await;
        assert!(logs.has_span("read_duty"));
        assert!(logs.has_span("write_duty"));
    }
}
