use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How an agent-reported reason code is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Counts as a failure: aborts readiness, fails the slot in a session.
    #[default]
    Hard,
    /// Reported to observers as information only.
    Soft,
}

/// Per-reason-code severity table.
///
/// ```toml
/// [policy]
/// default = "hard"
///
/// [policy.reasons]
/// not_betting_time = "soft"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonPolicy {
    pub default: Severity,
    pub reasons: HashMap<String, Severity>,
}

impl ReasonPolicy {
    pub fn severity(&self, code: Option<&str>) -> Severity {
        code.and_then(|c| self.reasons.get(c).copied())
            .unwrap_or(self.default)
    }
}
