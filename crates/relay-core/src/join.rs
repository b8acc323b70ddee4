//! `JOIN` payloads.

use serde::{Deserialize, Serialize};

/// Sent by a peer right after connecting: `{"ID":"u1","secretKey":"k"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Identity the peer claims.
    #[serde(rename = "ID")]
    pub id: String,
    /// Shared secret, when the deployment uses one.
    #[serde(rename = "secretKey", default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl JoinRequest {
    /// Request without a secret.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret_key: None,
        }
    }

    /// Attach a secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = Some(secret.into());
        self
    }
}

/// Acknowledgment a server may send back: `{"succ":true}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    /// Whether the join was accepted.
    pub succ: bool,
}
