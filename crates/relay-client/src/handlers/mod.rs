//! Client-side message handlers.

pub mod error;
pub mod join;

use relay_core::MessageKind;
use relay_hub::{HubBuilder, PeerPolicy};

pub use error::ServerErrorHandler;
pub use join::{JoinAckHandler, send_join};

/// Register every client handler on `builder`, replacing the built-in
/// `ERR` reply with [`ServerErrorHandler`].
pub fn register_all(builder: &mut HubBuilder) {
    let _ = builder
        .register(MessageKind::ERR, ServerErrorHandler)
        .register(MessageKind::JOIN, JoinAckHandler);
}

/// Kinds the server may send to a client.
pub fn default_policy() -> PeerPolicy {
    PeerPolicy::allow_list([MessageKind::ERR, MessageKind::JOIN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_err_and_join() {
        let mut builder = HubBuilder::new(4);
        register_all(&mut builder);
        let hub = builder.build().unwrap();
        assert_eq!(hub.kinds(), vec![MessageKind::ERR, MessageKind::JOIN]);
    }

    #[test]
    fn server_may_send_err_and_join() {
        let policy = default_policy();
        assert!(policy.is_allowed_from_peer(MessageKind::ERR));
        assert!(policy.is_allowed_from_peer(MessageKind::JOIN));
        assert!(!policy.is_allowed_from_peer(MessageKind(9)));
    }
}
