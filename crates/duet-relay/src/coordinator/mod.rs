//! Paired-bet coordinator.
//!
//! Owns the [`RegistryState`] and a [`Timers`] capability. Every entry point
//! runs one state transition to completion and queues the resulting frames
//! as [`Outbound`] commands; the caller drains them with
//! [`Coordinator::drain_outbound`] and delivers them best-effort.

mod assignment;
mod fanout;
mod liveness;
mod pairing;
mod single;


use std::time::Duration;

use duet_common::{ConnId, Identity, Side, Slot};
use duet_config::{DuetConfig, ReasonPolicy};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::protocol::{ClientMessage, ConnectedSlots, ServerMessage};
use crate::registry::{RegistryState, RoomPhase};
use crate::session::ReadinessReply;
use crate::timer::{FiredTimer, ManualTimers, TimerKind, Timers};

use pairing::ErrorReport;

/// Timing and policy knobs, resolved from config once at startup.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub readiness_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub settle_grace: Duration,
    pub max_missed_heartbeats: u32,
    pub room_ttl: Duration,
    pub policy: ReasonPolicy,
}

impl CoordinatorSettings {
    pub fn from_config(config: &DuetConfig) -> Self {
        Self {
            readiness_timeout: config.coordination.readiness_timeout(),
            dispatch_timeout: config.coordination.dispatch_timeout(),
            settle_grace: config.coordination.settle_grace(),
            max_missed_heartbeats: config.heartbeat.max_missed,
            room_ttl: config.reaper.room_ttl(),
            policy: config.policy.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&DuetConfig::default())
    }
}

/// A frame to deliver or a connection to close.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send { to: ConnId, message: ServerMessage },
    Close { conn: ConnId },
}

/// A bet requested through the control API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionRequest {
    #[serde(alias = "pc")]
    pub slot: Slot,
    pub amount: u64,
    pub side: Side,
    #[serde(default)]
    pub platform: Option<String>,
}

pub struct Coordinator<T: Timers> {
    state: RegistryState,
    timers: T,
    settings: CoordinatorSettings,
    outbox: Vec<Outbound>,
}

impl<T: Timers> Coordinator<T> {
    pub fn new(settings: CoordinatorSettings, timers: T) -> Self {
        Self {
            state: RegistryState::new(),
            timers,
            settings,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    /// Take every frame queued since the last drain.
    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn phase(&self, identity: &Identity) -> RoomPhase {
        self.state
            .room(identity)
            .map(|room| room.phase())
            .unwrap_or(RoomPhase::Idle)
    }

    pub fn connected(&self, identity: &Identity) -> ConnectedSlots {
        self.state
            .room(identity)
            .map(|room| room.connected())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// An authenticated connection joined `identity`'s room.
    pub fn connect(&mut self, conn: ConnId, identity: Identity) {
        self.touch(&identity);
        debug!(conn = %conn, room = %identity, "Connection attached");
        self.state.insert_peer(conn, identity);
    }

    /// The transport reported the connection gone.
    pub fn disconnect(&mut self, conn: ConnId) {
        self.drop_connection(conn);
    }

    pub fn handle_message(&mut self, conn: ConnId, message: ClientMessage) {
        let Some(identity) = self.identity_of(conn) else {
            warn!(conn = %conn, "Message from unknown connection");
            return;
        };
        self.touch(&identity);

        match message {
            ClientMessage::Hello { .. } => {
                debug!(conn = %conn, "Repeated hello ignored");
            }
            ClientMessage::RegisterStatusListener { .. } => {
                self.register_observer(&identity, conn);
            }
            ClientMessage::RequestAssignment {} => self.request_assignment(&identity, conn),
            ClientMessage::Register { slot } => self.register(&identity, conn, slot),
            ClientMessage::Pong {} => self.record_pong(&identity, conn),
            ClientMessage::BettingTimeCheck {
                result,
                message,
                error_type,
                bet_id,
            } => {
                let reply = if result {
                    ReadinessReply::Ready
                } else {
                    ReadinessReply::NotReady {
                        message,
                        error_type,
                    }
                };
                self.on_readiness_reply(&identity, conn, reply, bet_id)
            }
            ClientMessage::BetSuccess {
                amount,
                side,
                platform,
            } => self.on_bet_success(&identity, conn, amount, side, platform),
            ClientMessage::BetError {
                message,
                error_type,
                amount,
                side,
                platform,
            } => self.on_bet_error(
                &identity,
                conn,
                ErrorReport {
                    message,
                    error_type,
                    amount,
                    side,
                    platform,
                },
            ),
            ClientMessage::ChipClicked(report) => {
                self.forward_progress(&identity, conn, report, ServerMessage::ChipClicked)
            }
            ClientMessage::BetAreaClicked(report) => {
                self.forward_progress(&identity, conn, report, ServerMessage::BetAreaClicked)
            }
            ClientMessage::ConfirmClicked(report) => {
                self.forward_progress(&identity, conn, report, ServerMessage::ConfirmClicked)
            }
        }
    }

    pub fn on_timer(&mut self, fired: FiredTimer) {
        self.timers.cancel(fired.id);
        match fired.kind {
            TimerKind::ReadinessTimeout { room, bet_id } => self.readiness_timeout(&room, &bet_id),
            TimerKind::DispatchTimeout { room, bet_id } => self.dispatch_timeout(&room, &bet_id),
            TimerKind::SettleCleanup { room, bet_id } => self.settle_cleanup(&room, &bet_id),
        }
    }

    // -----------------------------------------------------------------------
    // Internals shared by the submodules
    // -----------------------------------------------------------------------

    fn identity_of(&self, conn: ConnId) -> Option<Identity> {
        self.state.peer(conn).and_then(|p| p.identity.clone())
    }

    /// The registered slot of `conn`, or an error frame back to it.
    fn agent_slot(&mut self, identity: &Identity, conn: ConnId) -> Option<Slot> {
        let slot = self
            .state
            .room(identity)
            .and_then(|room| room.slot_of(conn));
        if slot.is_none() {
            warn!(conn = %conn, room = %identity, "Agent message from unregistered connection");
            self.send(conn, ServerMessage::error("not registered as an agent"));
        }
        slot
    }

    fn touch(&mut self, identity: &Identity) {
        let now = self.timers.now();
        self.state.room_mut(identity, now).last_activity = now;
    }

    /// Queue a frame; connections that are no longer open are skipped.
    fn send(&mut self, to: ConnId, message: ServerMessage) {
        if self.state.is_open(to) {
            self.outbox.push(Outbound::Send { to, message });
        }
    }

    fn drop_connection(&mut self, conn: ConnId) {
        let Some((identity, slot)) = self.state.remove_peer(conn) else {
            return;
        };
        info!(conn = %conn, room = %identity, slot = ?slot, "Connection removed");
        if let Some(slot) = slot {
            self.abort_readiness_on_loss(&identity, slot);
        }
        self.touch(&identity);
        self.broadcast_status(&identity);
    }

    /// Forcibly close a connection and release everything it held.
    fn terminate(&mut self, conn: ConnId) {
        self.outbox.push(Outbound::Close { conn });
        self.drop_connection(conn);
    }
}

impl Coordinator<ManualTimers> {
    /// Advance virtual time and run every timer that falls due.
    pub fn advance(&mut self, by: Duration) {
        for fired in self.timers.advance(by) {
            self.on_timer(fired);
        }
    }
}
