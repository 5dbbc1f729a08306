use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two named agent roles in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Slot {
    #[serde(rename = "PC1")]
    A,
    #[serde(rename = "PC2")]
    B,
}

impl Slot {
    /// Assignment order: A is handed out before B.
    pub const ALL: [Slot; 2] = [Slot::A, Slot::B];

    pub fn sibling(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::A => "PC1",
            Slot::B => "PC2",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two mutually exclusive wager sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(alias = "player", alias = "PLAYER")]
    Player,
    #[serde(alias = "banker", alias = "BANKER")]
    Banker,
}

impl Side {
    pub fn complement(self) -> Side {
        match self {
            Side::Player => Side::Banker,
            Side::Banker => Side::Player,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Player => f.write_str("Player"),
            Side::Banker => f.write_str("Banker"),
        }
    }
}

/// Generated handle for a live connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Coarse grouping of the error codes agents report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    NotYetTime,
    WrongContext,
    Disabled,
    Unknown,
}

impl ReasonCategory {
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("not_betting_time") => ReasonCategory::NotYetTime,
            Some("wrong_tab" | "unsupported_platform" | "new_platform_error") => {
                ReasonCategory::WrongContext
            }
            Some("script_inactive" | "chip_disabled") => ReasonCategory::Disabled,
            _ => ReasonCategory::Unknown,
        }
    }
}
