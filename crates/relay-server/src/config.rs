//! Server configuration.

use std::time::Duration;

use relay_hub::ConnectionConfig;
use relay_settings::RelaySettings;

/// Everything the accepting side needs, resolved from [`RelaySettings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Upgrade route.
    pub path: String,
    /// Replace rather than reject a connection whose id is taken.
    pub replace_duplicate_ids: bool,
    /// Delay before a rejected duplicate is closed.
    pub reject_grace: Duration,
    /// Bound on [`RelayServer::shutdown`](crate::server::RelayServer::shutdown).
    pub shutdown_timeout: Duration,
    /// Bound on draining the hub's queues at shutdown.
    pub drain_timeout: Duration,
    /// Per-connection limits and timers.
    pub connection: ConnectionConfig,
}

impl ServerConfig {
    /// Resolve from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            path: settings.server.path.clone(),
            replace_duplicate_ids: settings.server.replace_duplicate_ids,
            reject_grace: settings.server.reject_grace(),
            shutdown_timeout: settings.server.shutdown_timeout(),
            drain_timeout: settings.hub.drain_timeout(),
            connection: ConnectionConfig::from_settings(&settings.connection),
        }
    }

    /// `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_address(), "0.0.0.0:9850");
        assert_eq!(cfg.path, "/ws");
        assert!(!cfg.replace_duplicate_ids);
        assert_eq!(cfg.reject_grace, Duration::from_secs(2));
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(cfg.connection.read_limit, 50 * 1024 * 1024);
    }

    #[test]
    fn settings_flow_through() {
        let mut settings = RelaySettings::default();
        settings.server.port = 0;
        settings.server.replace_duplicate_ids = true;
        settings.connection.ping_interval_ms = 1_000;
        settings.hub.drain_timeout_ms = 250;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.port, 0);
        assert!(cfg.replace_duplicate_ids);
        assert_eq!(cfg.connection.ping_interval, Duration::from_secs(1));
        assert_eq!(cfg.drain_timeout, Duration::from_millis(250));
    }
}
