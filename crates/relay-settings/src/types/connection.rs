//! Per-connection limits and timers.

use serde::{Deserialize, Serialize};

/// Limits and timers applied to every connection, on either side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Largest inbound frame; anything bigger ends the connection.
    pub read_limit_bytes: usize,
    /// Maximum wait for the next inbound frame.
    pub read_timeout_ms: u64,
    /// Deadline for writing one payload frame.
    pub write_timeout_ms: u64,
    /// Deadline for writing a ping.
    pub ping_write_timeout_ms: u64,
    /// Ping period.
    pub ping_interval_ms: u64,
    /// Heartbeat check period.
    pub heartbeat_check_interval_ms: u64,
    /// Silence after which the peer is considered dead.
    pub heartbeat_timeout_ms: u64,
    /// Delay between a close decision and registry cleanup.
    pub close_grace_ms: u64,
    /// Outbound queue bound; senders wait when it is full.
    pub outbound_capacity: usize,
    /// Dispatches a single connection may have in flight.
    pub max_inflight_dispatches: usize,
    /// Retry bound for deferred cleanup.
    pub cleanup_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_limit_bytes: 50 * 1024 * 1024,
            read_timeout_ms: 60_000,
            write_timeout_ms: 30_000,
            ping_write_timeout_ms: 10_000,
            ping_interval_ms: 30_000,
            heartbeat_check_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            close_grace_ms: 5_000,
            outbound_capacity: 60,
            max_inflight_dispatches: 32,
            cleanup_attempts: 3,
        }
    }
}
