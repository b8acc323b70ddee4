//! # relay-settings
//!
//! Layered settings for the relay hub, in priority order:
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.relay/settings.json` or an explicit path, deep-merged
//! 3. **Environment**: `RELAY_*` overrides
//!
//! Settings are loaded once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_file_layer, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::{
    ClientSettings, ConnectionSettings, HubSettings, LoggingSettings, RelaySettings,
    ServerSettings,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_documented_values() {
        let s = RelaySettings::default();
        assert_eq!(s.server.bind_address(), "0.0.0.0:9850");
        assert_eq!(s.server.path, "/ws");
        assert!(!s.server.replace_duplicate_ids);
        assert_eq!(s.server.reject_grace_ms, 2_000);
        assert_eq!(s.connection.read_limit_bytes, 52_428_800);
        assert_eq!(s.connection.heartbeat_timeout_ms, 60_000);
        assert_eq!(s.connection.close_grace_ms, 5_000);
        assert_eq!(s.connection.outbound_capacity, 60);
        assert_eq!(s.client.outbound_capacity, 50);
        assert_eq!(s.hub.queue_capacity, 30);
    }

    #[test]
    fn settings_path_under_home() {
        assert!(settings_path().ends_with(".relay/settings.json"));
    }
}
