//! Heartbeat probing of agents and garbage collection of stale state.

use duet_common::{ConnId, Identity};
use tracing::{debug, info, warn};

use super::Coordinator;
use crate::protocol::ServerMessage;
use crate::timer::Timers;

impl<T: Timers> Coordinator<T> {
    pub(super) fn record_pong(&mut self, identity: &Identity, conn: ConnId) {
        let now = self.timers.now();
        if let Some(agent) = self.state.room_mut(identity, now).agents.get_mut(&conn) {
            agent.alive = true;
        }
    }

    /// One heartbeat round over every agent in every room.
    ///
    /// An agent that has not answered the previous ping accrues a miss;
    /// reaching `max_missed_heartbeats` consecutive misses closes it.
    pub fn heartbeat_tick(&mut self) {
        let max_missed = self.settings.max_missed_heartbeats;
        let mut probes = Vec::new();
        let mut dead = Vec::new();

        for (identity, room) in self.state.rooms_mut() {
            for (conn, agent) in room.agents.iter_mut() {
                if agent.alive {
                    agent.missed_heartbeats = 0;
                } else {
                    agent.missed_heartbeats += 1;
                    if agent.missed_heartbeats >= max_missed {
                        warn!(
                            conn = %conn,
                            room = %identity,
                            slot = %agent.slot,
                            missed = agent.missed_heartbeats,
                            "Agent missed heartbeats, terminating"
                        );
                        dead.push(*conn);
                        continue;
                    }
                    debug!(conn = %conn, slot = %agent.slot, "Heartbeat missed");
                }
                agent.alive = false;
                probes.push(*conn);
            }
        }

        for conn in probes {
            self.send(conn, ServerMessage::Ping {});
        }
        for conn in dead {
            self.terminate(conn);
        }
    }

    /// Clear bet state that outlived its timers and drop idle empty rooms.
    ///
    /// A readiness check or session is stale once it is older than twice its
    /// timeout. Returns how many rooms were removed.
    pub fn reap(&mut self) -> usize {
        let now = self.timers.now();
        let readiness_limit = self.settings.readiness_timeout * 2;
        let dispatch_limit =
            (self.settings.dispatch_timeout + self.settings.settle_grace) * 2;

        let mut stale_checks = Vec::new();
        let mut stale_sessions = Vec::new();
        for identity in self.state.room_ids() {
            let Some(room) = self.state.room(&identity) else {
                continue;
            };
            if let Some(check) = &room.pending {
                if now.duration_since(check.created_at) > readiness_limit {
                    stale_checks.push((identity.clone(), check.bet_id.clone()));
                }
            }
            if let Some(session) = &room.active {
                if now.duration_since(session.started_at) > dispatch_limit {
                    stale_sessions.push((
                        identity.clone(),
                        session.bet_id.clone(),
                        session.settling,
                    ));
                }
            }
        }

        for (identity, bet_id) in stale_checks {
            warn!(room = %identity, bet_id = %bet_id, "Reaping stale readiness check");
            self.readiness_timeout(&identity, &bet_id);
        }
        for (identity, bet_id, settling) in stale_sessions {
            warn!(room = %identity, bet_id = %bet_id, "Reaping stale session");
            if !settling {
                self.dispatch_timeout(&identity, &bet_id);
            }
            self.settle_cleanup(&identity, &bet_id);
        }

        let removed = self.state.reap_idle(now, self.settings.room_ttl);
        if removed > 0 {
            info!(removed, remaining = self.state.room_count(), "Reaper pass complete");
        }
        removed
    }
}
