//! Per-room bet state: the readiness check and the dispatched session.

use std::collections::BTreeMap;
use std::time::Instant;

use duet_common::{Side, Slot};
use serde::{Deserialize, Serialize};

use crate::protocol::LegReport;
use crate::timer::TimerId;

/// What one slot is asked to bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub amount: u64,
    pub side: Side,
}

/// Both assignments for a paired bet: the initiator's as requested, the
/// sibling's on the complementary side.
pub fn paired_assignments(initiator: Slot, amount: u64, side: Side) -> BTreeMap<Slot, Assignment> {
    BTreeMap::from([
        (initiator, Assignment { amount, side }),
        (
            initiator.sibling(),
            Assignment {
                amount,
                side: side.complement(),
            },
        ),
    ])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessReply {
    Ready,
    NotReady {
        message: Option<String>,
        error_type: Option<String>,
    },
}

impl ReadinessReply {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessReply::Ready)
    }
}

/// Phase one of a paired bet: waiting for both agents to say they can act.
#[derive(Debug)]
pub struct PendingReadinessCheck {
    pub bet_id: String,
    pub platform: Option<String>,
    pub assignments: BTreeMap<Slot, Assignment>,
    pub replies: BTreeMap<Slot, ReadinessReply>,
    pub created_at: Instant,
    pub timer: TimerId,
}

impl PendingReadinessCheck {
    /// Store a reply. Returns false if the slot had already answered.
    pub fn record(&mut self, slot: Slot, reply: ReadinessReply) -> bool {
        if self.replies.contains_key(&slot) {
            return false;
        }
        self.replies.insert(slot, reply);
        true
    }

    pub fn is_complete(&self) -> bool {
        Slot::ALL.iter().all(|s| self.replies.contains_key(s))
    }

    pub fn all_ready(&self) -> bool {
        Slot::ALL
            .iter()
            .all(|s| self.replies.get(s).is_some_and(ReadinessReply::is_ready))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegStatus {
    Pending,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Leg {
    pub assignment: Assignment,
    pub status: LegStatus,
    pub reason: Option<String>,
}

impl Leg {
    fn pending(assignment: Assignment) -> Self {
        Self {
            assignment,
            status: LegStatus::Pending,
            reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == LegStatus::Pending
    }

    pub fn resolve(&mut self, status: LegStatus, reason: Option<String>) {
        self.status = status;
        self.reason = reason;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    AllSuccess,
    Partial,
    AllFailed,
    Cancelled,
}

/// Phase two: both agents were told to bet and we wait for their reports.
#[derive(Debug)]
pub struct ActiveSession {
    pub bet_id: String,
    pub platform: Option<String>,
    pub legs: BTreeMap<Slot, Leg>,
    pub started_at: Instant,
    pub timer: TimerId,
    /// Resolved by timeout and waiting out the grace delay.
    pub settling: bool,
}

impl ActiveSession {
    pub fn new(
        bet_id: String,
        platform: Option<String>,
        assignments: &BTreeMap<Slot, Assignment>,
        started_at: Instant,
        timer: TimerId,
    ) -> Self {
        Self {
            bet_id,
            platform,
            legs: assignments
                .iter()
                .map(|(slot, a)| (*slot, Leg::pending(*a)))
                .collect(),
            started_at,
            timer,
            settling: false,
        }
    }

    pub fn leg(&self, slot: Slot) -> Option<&Leg> {
        self.legs.get(&slot)
    }

    pub fn leg_mut(&mut self, slot: Slot) -> Option<&mut Leg> {
        self.legs.get_mut(&slot)
    }

    pub fn is_pending(&self, slot: Slot) -> bool {
        self.leg(slot).is_some_and(Leg::is_pending)
    }

    pub fn is_terminal(&self) -> bool {
        self.legs.values().all(|leg| !leg.is_pending())
    }

    pub fn outcome(&self) -> SessionOutcome {
        let statuses: Vec<LegStatus> = self.legs.values().map(|l| l.status).collect();
        if statuses.iter().all(|s| *s == LegStatus::Success) {
            SessionOutcome::AllSuccess
        } else if statuses
            .iter()
            .all(|s| matches!(s, LegStatus::Failed | LegStatus::Timeout))
        {
            SessionOutcome::AllFailed
        } else {
            SessionOutcome::Partial
        }
    }

    pub fn reports(&self) -> Vec<LegReport> {
        self.legs
            .iter()
            .map(|(slot, leg)| LegReport {
                slot: *slot,
                status: leg.status,
                amount: leg.assignment.amount,
                side: leg.assignment.side,
                reason: leg.reason.clone(),
            })
            .collect()
    }

    pub fn summary_message(&self) -> String {
        match self.outcome() {
            SessionOutcome::AllSuccess => "Both PCs successfully placed bets".to_string(),
            _ => {
                let parts: Vec<String> = self
                    .legs
                    .iter()
                    .map(|(slot, leg)| format!("{slot}={}", status_str(leg.status)))
                    .collect();
                format!("Bet completed with mixed results: {}", parts.join(", "))
            }
        }
    }
}

fn status_str(status: LegStatus) -> &'static str {
    match status {
        LegStatus::Pending => "pending",
        LegStatus::Success => "success",
        LegStatus::Failed => "failed",
        LegStatus::Timeout => "timeout",
        LegStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ActiveSession {
        let assignments = paired_assignments(Slot::A, 1000, Side::Player);
        ActiveSession::new("u_1".into(), None, &assignments, Instant::now(), TimerId(1))
    }

    #[test]
    fn assignments_are_complementary() {
        let a = paired_assignments(Slot::B, 250, Side::Banker);
        assert_eq!(a[&Slot::B].side, Side::Banker);
        assert_eq!(a[&Slot::A].side, Side::Player);
        assert_eq!(a[&Slot::A].amount, 250);
        assert_eq!(a[&Slot::B].amount, 250);
    }

    #[test]
    fn readiness_completion() {
        let mut check = PendingReadinessCheck {
            bet_id: "u_1".into(),
            platform: None,
            assignments: paired_assignments(Slot::A, 10, Side::Player),
            replies: BTreeMap::new(),
            created_at: Instant::now(),
            timer: TimerId(0),
        };
        assert!(check.record(Slot::A, ReadinessReply::Ready));
        assert!(!check.is_complete());
        assert!(!check.record(Slot::A, ReadinessReply::Ready));
        assert!(check.record(
            Slot::B,
            ReadinessReply::NotReady {
                message: None,
                error_type: None
            }
        ));
        assert!(check.is_complete());
        assert!(!check.all_ready());
    }

    #[test]
    fn outcome_all_success() {
        let mut s = session();
        for slot in Slot::ALL {
            s.leg_mut(slot).unwrap().resolve(LegStatus::Success, None);
        }
        assert!(s.is_terminal());
        assert_eq!(s.outcome(), SessionOutcome::AllSuccess);
        assert_eq!(s.summary_message(), "Both PCs successfully placed bets");
    }

    #[test]
    fn failure_with_cancelled_sibling_is_partial() {
        let mut s = session();
        s.leg_mut(Slot::A).unwrap().resolve(LegStatus::Failed, None);
        assert!(!s.is_terminal());
        s.leg_mut(Slot::B).unwrap().resolve(LegStatus::Cancelled, None);
        assert!(s.is_terminal());
        assert_eq!(s.outcome(), SessionOutcome::Partial);
        assert_eq!(
            s.summary_message(),
            "Bet completed with mixed results: PC1=failed, PC2=cancelled"
        );
    }

    #[test]
    fn both_failed_is_all_failed() {
        let mut s = session();
        s.leg_mut(Slot::A).unwrap().resolve(LegStatus::Failed, None);
        s.leg_mut(Slot::B).unwrap().resolve(LegStatus::Timeout, None);
        assert_eq!(s.outcome(), SessionOutcome::AllFailed);
    }
}
