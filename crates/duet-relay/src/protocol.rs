//! Wire protocol. Every frame is a JSON object tagged by `type`.
//!
//! Inbound frames are parsed into the closed [`ClientMessage`] set; anything
//! that does not match a variant (unknown type, missing required field) is
//! rejected at the connection boundary.

use chrono::{DateTime, Utc};
use duet_common::{ConnId, ReasonCategory, Side, Slot};
use duet_config::Severity;
use serde::{Deserialize, Serialize};

use crate::session::{LegStatus, SessionOutcome};

/// Messages agents and observers send to the relay.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Hello {
        token: String,
    },

    RegisterStatusListener {
        #[serde(default)]
        token: Option<String>,
    },

    RequestAssignment {},

    Register {
        #[serde(alias = "pc")]
        slot: Slot,
    },

    Pong {},

    /// Readiness reply. `bet_id` echoes the `checkBettingTime` it answers;
    /// agents that omit it are matched to the current check.
    BettingTimeCheck {
        result: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error_type: Option<String>,
        #[serde(default)]
        bet_id: Option<String>,
    },

    BetSuccess {
        amount: u64,
        side: Side,
        #[serde(default)]
        platform: Option<String>,
    },

    BetError {
        message: String,
        error_type: String,
        #[serde(default)]
        amount: Option<u64>,
        #[serde(default)]
        side: Option<Side>,
        #[serde(default)]
        platform: Option<String>,
    },

    ChipClicked(ProgressReport),
    BetAreaClicked(ProgressReport),
    ConfirmClicked(ProgressReport),
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The token carried by a first-frame message, if this is one.
    pub fn auth_token(&self) -> Option<&str> {
        match self {
            ClientMessage::Hello { token } => Some(token),
            ClientMessage::RegisterStatusListener { token } => token.as_deref(),
            _ => None,
        }
    }
}

/// Intermediate UI step reported by an agent while placing a bet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressReport {
    pub message: Option<String>,
    pub amount: Option<u64>,
    pub side: Option<Side>,
    pub platform: Option<String>,
}

/// Which slots currently have a live, registered agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedSlots {
    #[serde(rename = "PC1")]
    pub pc1: bool,
    #[serde(rename = "PC2")]
    pub pc2: bool,
}

impl ConnectedSlots {
    pub fn set(&mut self, slot: Slot, connected: bool) {
        match slot {
            Slot::A => self.pc1 = connected,
            Slot::B => self.pc2 = connected,
        }
    }

    pub fn get(&self, slot: Slot) -> bool {
        match slot {
            Slot::A => self.pc1,
            Slot::B => self.pc2,
        }
    }
}

/// Messages the relay sends to agents and observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Ping {},

    Assignment {
        slot: Slot,
    },

    Registered {
        slot: Slot,
        conn_id: ConnId,
    },

    Status {
        connected: ConnectedSlots,
    },

    /// Readiness request.
    CheckBettingTime {
        bet_id: String,
    },

    PlaceBet {
        amount: u64,
        side: Side,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform: Option<String>,
    },

    CancelBet {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        side: Option<Side>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platform: Option<String>,
    },

    BettingTimeCheck(ReadinessNotice),
    BetError(BetErrorNotice),
    BetSuccess(BetSuccessNotice),
    BetCompleted(CompletionSummary),

    ChipClicked(ProgressNotice),
    BetAreaClicked(ProgressNotice),
    ConfirmClicked(ProgressNotice),

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            code: None,
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain data with string keys.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"serialization failed: {e}"}}"#)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessNotice {
    pub slot: Slot,
    pub result: bool,
    pub message: Option<String>,
    pub error_type: Option<String>,
    pub bet_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetErrorNotice {
    pub slot: Slot,
    pub message: String,
    pub error_type: Option<String>,
    pub category: ReasonCategory,
    pub severity: Severity,
    pub amount: Option<u64>,
    pub side: Option<Side>,
    pub platform: Option<String>,
    pub bet_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSuccessNotice {
    pub slot: Slot,
    pub message: String,
    pub amount: u64,
    pub side: Side,
    pub platform: Option<String>,
    pub bet_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotice {
    pub slot: Slot,
    #[serde(flatten)]
    pub report: ProgressReport,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegReport {
    pub slot: Slot,
    pub status: LegStatus,
    pub amount: u64,
    pub side: Side,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub bet_id: String,
    pub outcome: SessionOutcome,
    pub message: String,
    pub legs: Vec<LegReport>,
    pub timestamp: DateTime<Utc>,
}
