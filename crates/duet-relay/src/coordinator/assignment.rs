//! First-come-first-served slot assignment and registration.

use duet_common::{ConnId, Identity, RelayError, Slot};
use tracing::{info, warn};

use super::Coordinator;
use crate::protocol::ServerMessage;
use crate::registry::AgentConnection;
use crate::timer::Timers;

impl<T: Timers> Coordinator<T> {
    /// Hand `conn` the first free slot, provisionally.
    pub(super) fn request_assignment(&mut self, identity: &Identity, conn: ConnId) {
        let held = self.state.peer(conn).and_then(|p| p.provisional).or_else(|| {
            self.state
                .room(identity)
                .and_then(|room| room.slot_of(conn))
        });
        if let Some(slot) = held {
            self.send(conn, ServerMessage::Assignment { slot });
            return;
        }

        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        let Some(slot) = Slot::ALL.into_iter().find(|s| !room.occupied.contains(s)) else {
            warn!(conn = %conn, room = %identity, "Both slots occupied, rejecting agent");
            let err = RelayError::SlotsExhausted;
            self.send(
                conn,
                ServerMessage::Error {
                    message: err.to_string(),
                    code: err.code().map(String::from),
                },
            );
            self.terminate(conn);
            return;
        };
        room.occupied.insert(slot);
        if let Some(peer) = self.state.peer_mut(conn) {
            peer.provisional = Some(slot);
        }

        info!(conn = %conn, room = %identity, slot = %slot, "Slot assigned");
        self.send(conn, ServerMessage::Assignment { slot });
    }

    /// Confirm a slot. Without a prior assignment the slot must be free.
    pub(super) fn register(&mut self, identity: &Identity, conn: ConnId, slot: Slot) {
        let provisional = self.state.peer(conn).and_then(|p| p.provisional);
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);

        let refusal = match (room.slot_of(conn), provisional) {
            (Some(current), _) if current == slot => {
                self.send(conn, ServerMessage::Registered { slot, conn_id: conn });
                return;
            }
            (Some(current), _) => Some(format!("already registered as {current}")),
            (None, Some(assigned)) if assigned != slot => {
                Some(format!("assigned {assigned}, cannot register as {slot}"))
            }
            (None, Some(_)) => None,
            (None, None) if room.occupied.contains(&slot) => {
                Some(format!("{slot} is already taken"))
            }
            (None, None) => {
                room.occupied.insert(slot);
                None
            }
        };
        if let Some(reason) = refusal {
            warn!(conn = %conn, room = %identity, slot = %slot, %reason, "Registration refused");
            self.send(conn, ServerMessage::error(reason));
            return;
        }

        room.agents.insert(conn, AgentConnection::new(slot));
        if let Some(peer) = self.state.peer_mut(conn) {
            peer.provisional = None;
        }

        info!(conn = %conn, room = %identity, slot = %slot, "Agent registered");
        self.send(conn, ServerMessage::Registered { slot, conn_id: conn });
        self.broadcast_status(identity);
    }
}
