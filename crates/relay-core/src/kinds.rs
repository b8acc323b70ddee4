//! Message kinds and structured error payloads.
//!
//! A kind is the 16-bit tag at the front of every frame. It selects the
//! handler on the receiving side and is the only part of a frame that is
//! decoded before dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 16-bit message kind tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKind(pub u16);

impl MessageKind {
    /// Reserved sentinel for malformed input and the unknown-kind fallback.
    pub const ERR: Self = Self(0);
    /// Peer announces itself after connecting.
    pub const JOIN: Self = Self(1);

    /// Raw tag value.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Whether this is the reserved `ERR` kind.
    pub const fn is_err(self) -> bool {
        self.0 == Self::ERR.0
    }
}

impl From<u16> for MessageKind {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<MessageKind> for u16 {
    fn from(kind: MessageKind) -> Self {
        kind.0
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ERR => write!(f, "ERR"),
            Self::JOIN => write!(f, "JOIN"),
            Self(other) => write!(f, "{other:#06x}"),
        }
    }
}

/// Error codes carried in [`ErrorBody::code`].
pub mod error_codes {
    /// The peer sent a kind with no registered handler.
    pub const NO_MSGTYPE: i32 = 4001;
}

/// Structured error payload sent back to a peer, e.g.
/// `{"code":4001,"message":"no such message type"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code from [`error_codes`].
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    /// The fallback response for an unknown kind.
    pub fn no_such_message_type() -> Self {
        Self {
            code: error_codes::NO_MSGTYPE,
            message: "no such message type".into(),
        }
    }
}
