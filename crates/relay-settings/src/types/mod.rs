//! Settings types.
//!
//! Every struct is `#[serde(rename_all = "camelCase", default)]` so a
//! settings file only has to name the keys it changes.

mod client;
mod connection;
mod hub;
mod server;

pub use client::ClientSettings;
pub use connection::ConnectionSettings;
pub use hub::HubSettings;
pub use server::ServerSettings;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Accepting side.
    pub server: ServerSettings,
    /// Per-connection limits and timers, shared by both sides.
    pub connection: ConnectionSettings,
    /// Handler hub.
    pub hub: HubSettings,
    /// Initiating side.
    pub client: ClientSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values that would make the hub unusable.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        let zero_checks = [
            ("connection.readLimitBytes", c.read_limit_bytes == 0),
            ("connection.outboundCapacity", c.outbound_capacity == 0),
            ("connection.maxInflightDispatches", c.max_inflight_dispatches == 0),
            ("connection.pingIntervalMs", c.ping_interval_ms == 0),
            ("connection.heartbeatCheckIntervalMs", c.heartbeat_check_interval_ms == 0),
            ("connection.cleanupAttempts", c.cleanup_attempts == 0),
            ("hub.queueCapacity", self.hub.queue_capacity == 0),
            ("client.outboundCapacity", self.client.outbound_capacity == 0),
        ];
        if let Some((key, _)) = zero_checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(SettingsError::invalid(key, "must be at least 1"));
        }
        if !self.server.path.starts_with('/') {
            return Err(SettingsError::invalid(
                "server.path",
                format!("must start with '/', got {:?}", self.server.path),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "compact".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_validate() {
        RelaySettings::default().validate().unwrap();
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert_eq!(json["server"]["replaceDuplicateIds"], false);
        assert_eq!(json["connection"]["readLimitBytes"], 50 * 1024 * 1024);
        assert_eq!(json["hub"]["queueCapacity"], 30);
        assert_eq!(json["logging"]["level"], "info");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: RelaySettings =
            serde_json::from_str(r#"{"connection": {"closeGraceMs": 10}}"#).unwrap();
        assert_eq!(settings.connection.close_grace_ms, 10);
        assert_eq!(settings.connection.outbound_capacity, 60);
        assert_eq!(settings.server.port, 9850);
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let mut settings = RelaySettings::default();
        settings.hub.queue_capacity = 0;
        assert_matches!(settings.validate(), Err(SettingsError::Invalid { key: "hub.queueCapacity", .. }));
    }

    #[test]
    fn relative_path_rejected() {
        let mut settings = RelaySettings::default();
        settings.server.path = "ws".into();
        assert_matches!(settings.validate(), Err(SettingsError::Invalid { key: "server.path", .. }));
    }
}
