//! Observer registration and room-wide broadcasts.

use chrono::Utc;
use duet_common::{ConnId, Identity};
use tracing::{debug, info};

use super::Coordinator;
use crate::protocol::{ProgressNotice, ProgressReport, ServerMessage};
use crate::timer::Timers;

impl<T: Timers> Coordinator<T> {
    /// Subscribe `conn` to the room's broadcasts. Idempotent.
    pub(super) fn register_observer(&mut self, identity: &Identity, conn: ConnId) {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        if room.observers.insert(conn) {
            info!(conn = %conn, room = %identity, "Status listener registered");
        }
        let connected = room.connected();
        self.send(conn, ServerMessage::Status { connected });
    }

    /// Push live slot status to every observer and every agent.
    pub(super) fn broadcast_status(&mut self, identity: &Identity) {
        let Some(room) = self.state.room(identity) else {
            return;
        };
        let connected = room.connected();
        let audience = room.status_audience();
        debug!(room = %identity, ?connected, "Broadcasting status");
        for conn in audience {
            self.send(conn, ServerMessage::Status { connected });
        }
    }

    /// Push an event to the room's observers.
    pub(super) fn broadcast_event(&mut self, identity: &Identity, message: ServerMessage) {
        let Some(room) = self.state.room(identity) else {
            return;
        };
        let observers: Vec<ConnId> = room.observers.iter().copied().collect();
        for conn in observers {
            self.send(conn, message.clone());
        }
    }

    pub(super) fn forward_progress(
        &mut self,
        identity: &Identity,
        conn: ConnId,
        report: ProgressReport,
        wrap: fn(ProgressNotice) -> ServerMessage,
    ) {
        let Some(slot) = self.agent_slot(identity, conn) else {
            return;
        };
        let notice = ProgressNotice {
            slot,
            report,
            timestamp: Utc::now(),
        };
        self.broadcast_event(identity, wrap(notice));
    }
}
