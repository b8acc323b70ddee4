//! Resolved client configuration.

use std::time::Duration;

use relay_hub::ConnectionConfig;
use relay_settings::RelaySettings;

use crate::errors::{ClientError, Result};

/// What [`crate::RelayClient::connect`] needs to dial and run.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Server endpoint, `ws://` or `wss://`.
    pub url: String,
    /// Identity announced in the upgrade query.
    pub id: Option<String>,
    /// Secret sent with `JOIN`.
    pub secret_key: Option<String>,
    /// Bound on draining the client hub when the connection ends.
    pub drain_timeout: Duration,
    /// Per-connection timings and limits.
    pub connection: ConnectionConfig,
}

impl ClientConfig {
    /// Resolve from loaded settings. The client's outbound bound replaces
    /// the shared connection default.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self {
            url: settings.client.url.clone(),
            id: settings.client.id.clone(),
            secret_key: settings.client.secret_key.clone(),
            drain_timeout: settings.hub.drain_timeout(),
            connection: ConnectionConfig::from_settings(&settings.connection)
                .with_outbound_capacity(settings.client.outbound_capacity),
        }
    }

    /// The URL to dial, with `id` appended as a query parameter.
    pub fn connect_url(&self) -> Result<String> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ClientError::InvalidUrl {
                url: self.url.clone(),
                reason: "scheme must be ws or wss",
            });
        }
        let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(self.url.clone());
        };
        if !id.bytes().all(is_unreserved) {
            return Err(ClientError::InvalidUrl {
                url: self.url.clone(),
                reason: "id must only contain unreserved URL characters",
            });
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{separator}id={id}", self.url))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&RelaySettings::default())
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}
