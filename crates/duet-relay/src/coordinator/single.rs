//! One-agent bets. No readiness check, no tracking.
//!
//! Reports carry no bet id, so a single bet is only accepted while the room
//! is idle; otherwise its report would be read as a paired leg's result.

use duet_common::{Identity, RelayError};
use tracing::{info, warn};

use super::{ActionRequest, Coordinator};
use crate::protocol::ServerMessage;
use crate::registry::RoomPhase;
use crate::timer::Timers;

impl<T: Timers> Coordinator<T> {
    /// Send `request` straight to the agent in `request.slot`. The result is
    /// only seen by observers through the agent's own report.
    pub fn dispatch_single(
        &mut self,
        identity: &Identity,
        request: ActionRequest,
    ) -> Result<(), RelayError> {
        let now = self.timers.now();
        let room = self.state.room_mut(identity, now);
        room.last_activity = now;
        if room.phase() != RoomPhase::Idle {
            warn!(
                room = %identity,
                slot = %request.slot,
                "Single bet rejected, paired bet in progress"
            );
            return Err(RelayError::SessionAlreadyInProgress);
        }
        let Some(conn) = room.agent_for(request.slot) else {
            warn!(
                room = %identity,
                slot = %request.slot,
                "Single bet rejected, agent not connected"
            );
            return Err(RelayError::AgentNotConnected(request.slot));
        };

        info!(
            room = %identity,
            slot = %request.slot,
            amount = request.amount,
            side = %request.side,
            "Dispatching single bet"
        );
        self.send(
            conn,
            ServerMessage::PlaceBet {
                amount: request.amount,
                side: request.side,
                platform: request.platform,
            },
        );
        Ok(())
    }
}
