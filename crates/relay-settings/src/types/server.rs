//! Accepting side.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Listener and accept-path settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port. `0` picks a free port.
    pub port: u16,
    /// Upgrade route.
    pub path: String,
    /// On a duplicate id, replace the registered connection instead of
    /// rejecting the newcomer.
    pub replace_duplicate_ids: bool,
    /// Delay before a rejected connection is closed.
    pub reject_grace_ms: u64,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout_ms: u64,
}

impl ServerSettings {
    /// `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// [`Self::reject_grace_ms`] as a duration.
    pub fn reject_grace(&self) -> Duration {
        Duration::from_millis(self.reject_grace_ms)
    }

    /// [`Self::shutdown_timeout_ms`] as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9850,
            path: "/ws".into(),
            replace_duplicate_ids: false,
            reject_grace_ms: 2_000,
            shutdown_timeout_ms: 30_000,
        }
    }
}
