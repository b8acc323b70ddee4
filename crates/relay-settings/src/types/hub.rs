//! Handler hub.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Handler hub sizing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Per-kind queue bound; dispatch waits when it is full.
    pub queue_capacity: usize,
    /// How long shutdown waits for workers to drain their queues.
    pub drain_timeout_ms: u64,
}

impl HubSettings {
    /// [`Self::drain_timeout_ms`] as a duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 30,
            drain_timeout_ms: 10_000,
        }
    }
}
