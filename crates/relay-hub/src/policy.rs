//! Inbound peer policy: which kinds a remote peer may originate.
//!
//! Consulted by the read duty before dispatch. A kind outside the policy
//! is dropped without a reply, whether or not a handler exists for it.

use std::collections::HashSet;

use relay_core::MessageKind;

/// Set of kinds a peer is allowed to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerPolicy {
    allowed: Option<HashSet<MessageKind>>,
}

impl PeerPolicy {
    /// Admit only `kinds`.
    pub fn allow_list(kinds: impl IntoIterator<Item = MessageKind>) -> Self {
        Self {
            allowed: Some(kinds.into_iter().collect()),
        }
    }

    /// Admit every kind. Unknown kinds then reach the `ERR` fallback.
    pub fn allow_all() -> Self {
        Self { allowed: None }
    }

    /// Whether a peer may send `kind`.
    pub fn is_allowed_from_peer(&self, kind: MessageKind) -> bool {
        self.allowed.as_ref().is_none_or(|set| set.contains(&kind))
    }

    /// Sorted allow-list, or `None` when every kind is admitted.
    pub fn allowed_kinds(&self) -> Option<Vec<MessageKind>> {
        self.allowed.as_ref().map(|set| {
            let mut kinds: Vec<_> = set.iter().copied().collect();
            kinds.sort_unstable();
            kinds
        })
    }
}
