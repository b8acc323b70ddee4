//! Initiating side.

use serde::{Deserialize, Serialize};

/// Dial settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server endpoint.
    pub url: String,
    /// Identity to announce; the server mints one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Secret sent with `JOIN`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Outbound queue bound on the client side.
    pub outbound_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9850/ws".into(),
            id: None,
            secret_key: None,
            outbound_capacity: 50,
        }
    }
}
