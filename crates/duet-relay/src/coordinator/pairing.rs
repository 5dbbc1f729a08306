//! Two-phase paired bets: readiness check, then tracked dispatch with
//! cross-cancellation.
//!
//! Room states run `Idle -> ReadinessPending -> Dispatching -> Idle`. Only
//! an idle room accepts a new pairing request.

use chrono::Utc;
use duet_common::{new_bet_id, ConnId, Identity, ReasonCategory, RelayError, Side, Slot};
use duet_config::Severity;
use tracing::{debug, info, warn};

use super::{ActionRequest, Coordinator};
use crate::protocol::{
    BetErrorNotice, BetSuccessNotice, CompletionSummary, ReadinessNotice, ServerMessage,
};
use crate::registry::RoomPhase;
use crate::session::{
    paired_assignments, ActiveSession, Assignment, LegStatus, PendingReadinessCheck,
    ReadinessReply, SessionOutcome,
};
use crate::timer::{TimerKind, Timers};

/// A `betError` frame as reported by an agent.
#[derive(Debug, Clone)]
pub(crate) struct ErrorReport {
    pub message: String,
    pub error_type: String,
    pub amount: Option<u64>,
    pub side: Option<Side>,
    pub platform: Option<String>,
}

impl<T: Timers> Coordinator<T> {
    /// Start a paired bet: `request.slot` bets as asked, its sibling bets the
    /// same amount on the other side. Returns the bet id.
    pub fn pair(
        &mut self,
        identity: &Identity,
        request: ActionRequest,
    ) -> Result<String, RelayError> {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        room.last_activity = now;

        if room.phase() != RoomPhase::Idle {
            warn!(room = %identity, "Pairing rejected, bet already in progress");
            return Err(RelayError::SessionAlreadyInProgress);
        }
        let (Some(conn_a), Some(conn_b)) = (room.agent_for(Slot::A), room.agent_for(Slot::B))
        else {
            return Err(RelayError::AgentsNotConnected);
        };

        let bet_id = new_bet_id(identity);
        let timer = self.timers.schedule(
            self.settings.readiness_timeout,
            TimerKind::ReadinessTimeout {
                room: identity.clone(),
                bet_id: bet_id.clone(),
            },
        );
        room.pending = Some(PendingReadinessCheck {
            bet_id: bet_id.clone(),
            platform: request.platform,
            assignments: paired_assignments(request.slot, request.amount, request.side),
            replies: Default::default(),
            created_at: now,
            timer,
        });

        info!(
            room = %identity,
            bet_id = %bet_id,
            initiator = %request.slot,
            amount = request.amount,
            side = %request.side,
            "Readiness check sent to both agents"
        );
        for conn in [conn_a, conn_b] {
            self.send(
                conn,
                ServerMessage::CheckBettingTime {
                    bet_id: bet_id.clone(),
                },
            );
        }
        Ok(bet_id)
    }

    /// Record an agent's answer to the pending readiness check. A reply that
    /// names a different bet answers an earlier check and is dropped.
    pub(super) fn on_readiness_reply(
        &mut self,
        identity: &Identity,
        conn: ConnId,
        reply: ReadinessReply,
        answered: Option<String>,
    ) {
        let Some(slot) = self.agent_slot(identity, conn) else {
            return;
        };
        let pending_bet = self
            .state
            .room(identity)
            .and_then(|room| room.pending.as_ref())
            .map(|check| check.bet_id.clone());
        if let Some(answered) = answered.as_deref() {
            if pending_bet.as_deref() != Some(answered) {
                debug!(
                    room = %identity,
                    slot = %slot,
                    bet_id = %answered,
                    "Stale readiness reply dropped"
                );
                return;
            }
        }

        let (message, error_type) = match &reply {
            ReadinessReply::Ready => (None, None),
            ReadinessReply::NotReady {
                message,
                error_type,
            } => (message.clone(), error_type.clone()),
        };
        self.broadcast_event(
            identity,
            ServerMessage::BettingTimeCheck(ReadinessNotice {
                slot,
                result: reply.is_ready(),
                message,
                error_type,
                bet_id: pending_bet,
                timestamp: Utc::now(),
            }),
        );

        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        let Some(check) = room.pending.as_mut() else {
            debug!(room = %identity, slot = %slot, "Readiness reply with no check pending");
            return;
        };
        if !check.record(slot, reply) {
            debug!(room = %identity, slot = %slot, "Duplicate readiness reply ignored");
            return;
        }
        if check.is_complete() {
            self.resolve_readiness(identity);
        }
    }

    /// Both replies are in: dispatch, or report who refused.
    fn resolve_readiness(&mut self, identity: &Identity) {
        let now = self.timers.now();
        let Some(check) = self.state.room_mut(identity, now).pending.take() else {
            return;
        };
        self.timers.cancel(check.timer);

        if check.all_ready() {
            self.start_dispatch(identity, check);
            return;
        }

        info!(room = %identity, bet_id = %check.bet_id, "Pairing aborted, not all agents ready");
        for slot in Slot::ALL {
            if let Some(ReadinessReply::NotReady {
                message,
                error_type,
            }) = check.replies.get(&slot)
            {
                let reason = message.clone().unwrap_or_else(|| "declined".into());
                self.report_not_ready(identity, &check, slot, reason, error_type.clone());
            }
        }
    }

    pub(super) fn readiness_timeout(&mut self, identity: &Identity, bet_id: &str) {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        if room.pending.as_ref().map(|c| c.bet_id.as_str()) != Some(bet_id) {
            return;
        }
        let Some(check) = room.pending.take() else {
            return;
        };
        self.timers.cancel(check.timer);

        warn!(room = %identity, bet_id = %bet_id, "Readiness check timed out");
        let waited = self.settings.readiness_timeout.as_millis();
        for slot in Slot::ALL {
            match check.replies.get(&slot) {
                None => self.report_not_ready(
                    identity,
                    &check,
                    slot,
                    format!("no readiness reply within {waited} ms"),
                    Some("readiness_timeout".into()),
                ),
                Some(ReadinessReply::NotReady {
                    message,
                    error_type,
                }) => {
                    let reason = message.clone().unwrap_or_else(|| "declined".into());
                    self.report_not_ready(identity, &check, slot, reason, error_type.clone());
                }
                Some(ReadinessReply::Ready) => {}
            }
        }
    }

    /// A slot's agent vanished while its readiness reply was outstanding.
    pub(super) fn abort_readiness_on_loss(&mut self, identity: &Identity, slot: Slot) {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        let Some(check) = room.pending.take() else {
            return;
        };
        self.timers.cancel(check.timer);

        warn!(
            room = %identity,
            bet_id = %check.bet_id,
            slot = %slot,
            "Agent lost during readiness check"
        );
        self.report_not_ready(
            identity,
            &check,
            slot,
            "disconnected during readiness check".into(),
            Some("disconnected".into()),
        );
    }

    fn report_not_ready(
        &mut self,
        identity: &Identity,
        check: &PendingReadinessCheck,
        slot: Slot,
        reason: String,
        error_type: Option<String>,
    ) {
        let assignment = check.assignments.get(&slot).copied();
        let severity = self.settings.policy.severity(error_type.as_deref());
        let notice = BetErrorNotice {
            slot,
            message: RelayError::AgentNotReady { slot, reason }.to_string(),
            category: ReasonCategory::from_code(error_type.as_deref()),
            error_type,
            severity,
            amount: assignment.map(|a| a.amount),
            side: assignment.map(|a| a.side),
            platform: check.platform.clone(),
            bet_id: Some(check.bet_id.clone()),
            timestamp: Utc::now(),
        };
        self.broadcast_event(identity, ServerMessage::BetError(notice));
    }

    fn start_dispatch(&mut self, identity: &Identity, check: PendingReadinessCheck) {
        let now = self.timers.now();
        let timer = self.timers.schedule(
            self.settings.dispatch_timeout,
            TimerKind::DispatchTimeout {
                room: identity.clone(),
                bet_id: check.bet_id.clone(),
            },
        );
        let room = self.state.room_mut(identity, now);
        let targets: Vec<(ConnId, Assignment)> = check
            .assignments
            .iter()
            .filter_map(|(slot, a)| room.agent_for(*slot).map(|conn| (conn, *a)))
            .collect();
        room.active = Some(ActiveSession::new(
            check.bet_id.clone(),
            check.platform.clone(),
            &check.assignments,
            now,
            timer,
        ));

        info!(
            room = %identity,
            bet_id = %check.bet_id,
            "Both agents ready, dispatching paired bet"
        );
        for (conn, assignment) in targets {
            self.send(
                conn,
                ServerMessage::PlaceBet {
                    amount: assignment.amount,
                    side: assignment.side,
                    platform: check.platform.clone(),
                },
            );
        }
    }

    /// The bet id of the in-flight session if `slot` is still awaited in it.
    fn tracking_bet(&self, identity: &Identity, slot: Slot) -> Option<String> {
        self.state
            .room(identity)
            .and_then(|room| room.active.as_ref())
            .filter(|session| !session.settling && session.is_pending(slot))
            .map(|session| session.bet_id.clone())
    }

    pub(super) fn on_bet_success(
        &mut self,
        identity: &Identity,
        conn: ConnId,
        amount: u64,
        side: Side,
        platform: Option<String>,
    ) {
        let Some(slot) = self.agent_slot(identity, conn) else {
            return;
        };
        let bet_id = self.tracking_bet(identity, slot);
        self.broadcast_event(
            identity,
            ServerMessage::BetSuccess(BetSuccessNotice {
                slot,
                message: format!("Bet placed successfully on {slot}"),
                amount,
                side,
                platform,
                bet_id: bet_id.clone(),
                timestamp: Utc::now(),
            }),
        );

        if bet_id.is_none() {
            return;
        }
        let now = self.timers.now();
        if let Some(leg) = self
            .state
            .room_mut(identity, now)
            .active
            .as_mut()
            .and_then(|s| s.leg_mut(slot))
        {
            leg.resolve(LegStatus::Success, None);
        }
        self.finish_if_terminal(identity);
    }

    pub(super) fn on_bet_error(&mut self, identity: &Identity, conn: ConnId, report: ErrorReport) {
        let Some(slot) = self.agent_slot(identity, conn) else {
            return;
        };
        let severity = self.settings.policy.severity(Some(report.error_type.as_str()));
        let bet_id = self.tracking_bet(identity, slot);
        warn!(
            room = %identity,
            slot = %slot,
            error_type = %report.error_type,
            ?severity,
            "Agent reported bet error: {}",
            report.message
        );
        self.broadcast_event(
            identity,
            ServerMessage::BetError(BetErrorNotice {
                slot,
                message: report.message.clone(),
                error_type: Some(report.error_type.clone()),
                category: ReasonCategory::from_code(Some(report.error_type.as_str())),
                severity,
                amount: report.amount,
                side: report.side,
                platform: report.platform.clone(),
                bet_id: bet_id.clone(),
                timestamp: Utc::now(),
            }),
        );

        if bet_id.is_none() || severity == Severity::Soft {
            return;
        }
        self.fail_leg(identity, slot, report.message);
        self.finish_if_terminal(identity);
    }

    /// Mark `slot` failed and cancel its sibling if that side is still open.
    fn fail_leg(&mut self, identity: &Identity, slot: Slot, reason: String) {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        let sibling = slot.sibling();
        let sibling_conn = room.agent_for(sibling);
        let Some(session) = room.active.as_mut() else {
            return;
        };
        if let Some(leg) = session.leg_mut(slot) {
            let failure = RelayError::AgentActionFailed { slot, reason };
            leg.resolve(LegStatus::Failed, Some(failure.to_string()));
        }

        let cancel = match session.leg_mut(sibling) {
            Some(leg) if leg.is_pending() => {
                leg.resolve(
                    LegStatus::Cancelled,
                    Some(format!("Cancelled due to failure on {slot}")),
                );
                Some(leg.assignment)
            }
            _ => None,
        };
        let platform = session.platform.clone();
        let bet_id = session.bet_id.clone();

        if let Some(assignment) = cancel {
            info!(
                room = %identity,
                bet_id = %bet_id,
                "Cancelling {sibling} after failure on {slot}"
            );
            self.send_cancel(sibling_conn, sibling, Some(assignment), platform);
        }
    }

    fn send_cancel(
        &mut self,
        conn: Option<ConnId>,
        slot: Slot,
        assignment: Option<Assignment>,
        platform: Option<String>,
    ) {
        let Some(conn) = conn else {
            warn!(slot = %slot, "Could not send cancel, agent not connected");
            return;
        };
        self.send(
            conn,
            ServerMessage::CancelBet {
                amount: assignment.map(|a| a.amount),
                side: assignment.map(|a| a.side),
                platform,
            },
        );
    }

    /// Emit the summary and drop the session once neither leg is pending.
    fn finish_if_terminal(&mut self, identity: &Identity) {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        if !room.active.as_ref().is_some_and(ActiveSession::is_terminal) {
            return;
        }
        let Some(session) = room.active.take() else {
            return;
        };
        self.timers.cancel(session.timer);
        let summary = completion(&session, None);
        info!(
            room = %identity,
            bet_id = %session.bet_id,
            outcome = ?summary.outcome,
            "Paired bet completed"
        );
        self.broadcast_event(identity, ServerMessage::BetCompleted(summary));
    }

    pub(super) fn dispatch_timeout(&mut self, identity: &Identity, bet_id: &str) {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        let Some(session) = room
            .active
            .as_mut()
            .filter(|s| s.bet_id == bet_id && !s.settling)
        else {
            return;
        };

        let mut cancels: Vec<(Slot, Assignment)> = Vec::new();
        for slot in Slot::ALL {
            if !session.is_pending(slot) {
                continue;
            }
            warn!(room = %identity, bet_id = %bet_id, slot = %slot, "Agent timed out");
            if let Some(leg) = session.leg_mut(slot) {
                leg.resolve(
                    LegStatus::Timeout,
                    Some("No response within timeout period".into()),
                );
            }
            let sibling = slot.sibling();
            if let Some(leg) = session.leg_mut(sibling).filter(|l| l.is_pending()) {
                leg.resolve(
                    LegStatus::Cancelled,
                    Some(format!("Cancelled due to {slot} timeout")),
                );
                cancels.push((sibling, leg.assignment));
            }
        }
        session.settling = true;
        let summary = completion(session, None);
        let platform = session.platform.clone();
        let targets: Vec<(Slot, Option<ConnId>, Assignment)> = cancels
            .into_iter()
            .map(|(slot, a)| (slot, room.agent_for(slot), a))
            .collect();

        let grace = self.timers.schedule(
            self.settings.settle_grace,
            TimerKind::SettleCleanup {
                room: identity.clone(),
                bet_id: bet_id.to_string(),
            },
        );
        if let Some(session) = self.state.room_mut(identity, now).active.as_mut() {
            session.timer = grace;
        }

        for (slot, conn, assignment) in targets {
            self.send_cancel(conn, slot, Some(assignment), platform.clone());
        }
        self.broadcast_event(identity, ServerMessage::BetCompleted(summary));
    }

    pub(super) fn settle_cleanup(&mut self, identity: &Identity, bet_id: &str) {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        if room
            .active
            .as_ref()
            .is_some_and(|s| s.bet_id == bet_id && s.settling)
        {
            if let Some(session) = room.active.take() {
                self.timers.cancel(session.timer);
            }
            debug!(room = %identity, bet_id = %bet_id, "Timed-out session cleared");
        }
    }

    /// User-initiated cancel: drop any bet state and tell every agent to
    /// cancel. Returns how many agents were sent a cancel.
    pub fn cancel_all(&mut self, identity: &Identity) -> usize {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        room.last_activity = now;
        let pending = room.pending.take();
        let active = room.active.take();
        let agents: Vec<ConnId> = room.agents.keys().copied().collect();

        if let Some(check) = pending {
            self.timers.cancel(check.timer);
            info!(room = %identity, bet_id = %check.bet_id, "Readiness check cancelled by user");
        }
        if let Some(mut session) = active {
            self.timers.cancel(session.timer);
            for leg in session.legs.values_mut().filter(|l| l.is_pending()) {
                leg.resolve(
                    LegStatus::Cancelled,
                    Some("User cancelled via cancel button".into()),
                );
            }
            info!(room = %identity, bet_id = %session.bet_id, "Paired bet cancelled by user");
            if !session.settling {
                let summary = completion(&session, Some(SessionOutcome::Cancelled));
                self.broadcast_event(identity, ServerMessage::BetCompleted(summary));
            }
        }

        let mut cancelled = 0;
        for conn in agents {
            if self.state.is_open(conn) {
                self.send(
                    conn,
                    ServerMessage::CancelBet {
                        amount: None,
                        side: None,
                        platform: None,
                    },
                );
                cancelled += 1;
            }
        }
        cancelled
    }
}

fn completion(session: &ActiveSession, outcome: Option<SessionOutcome>) -> CompletionSummary {
    let outcome = outcome.unwrap_or_else(|| session.outcome());
    let message = match outcome {
        SessionOutcome::Cancelled => "Bet cancelled by user".to_string(),
        _ => session.summary_message(),
    };
    CompletionSummary {
        bet_id: session.bet_id.clone(),
        outcome,
        message,
        legs: session.reports(),
        timestamp: Utc::now(),
    }
}
