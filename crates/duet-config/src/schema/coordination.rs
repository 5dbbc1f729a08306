use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Paired-bet timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// How long both agents have to answer a readiness check.
    pub readiness_timeout_ms: u64,
    /// How long dispatched agents have to report success or failure.
    pub dispatch_timeout_ms: u64,
    /// Delay before a timed-out session is dropped.
    pub settle_grace_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 5_000,
            dispatch_timeout_ms: 10_000,
            settle_grace_ms: 2_000,
        }
    }
}

impl CoordinationConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn settle_grace(&self) -> Duration {
        Duration::from_millis(self.settle_grace_ms)
    }
}
