//! Server-side message handlers.

pub mod join;

use relay_core::MessageKind;
use relay_hub::{HubBuilder, PeerPolicy};

pub use join::JoinHandler;

/// Register every server handler on `builder`.
pub fn register_all(builder: &mut HubBuilder) {
    let _ = builder.register(MessageKind::JOIN, JoinHandler);
}

/// Kinds a client may send to the server.
pub fn default_policy() -> PeerPolicy {
    PeerPolicy::allow_list([MessageKind::JOIN])
}
