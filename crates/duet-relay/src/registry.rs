//! Room registry: per-identity partitions of agents, observers and bet state.
//!
//! Connections are referenced only by [`ConnId`]. The registry tracks every
//! open connection in `peers` and, once a connection belongs to a room, its
//! agent or observer role inside that [`Room`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use duet_common::{ConnId, Identity, Slot};

use crate::protocol::ConnectedSlots;
use crate::session::{ActiveSession, PendingReadinessCheck};

/// A registered agent connection.
#[derive(Debug, Clone)]
pub struct AgentConnection {
    pub slot: Slot,
    /// Cleared on every heartbeat probe, set again by `pong`.
    pub alive: bool,
    pub missed_heartbeats: u32,
}

impl AgentConnection {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            alive: true,
            missed_heartbeats: 0,
        }
    }
}

/// Coordinator-visible state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Idle,
    ReadinessPending,
    Dispatching,
}

#[derive(Debug)]
pub struct Room {
    pub agents: BTreeMap<ConnId, AgentConnection>,
    /// Slots held by registered agents or provisionally by assigned ones.
    pub occupied: BTreeSet<Slot>,
    pub observers: BTreeSet<ConnId>,
    pub pending: Option<PendingReadinessCheck>,
    pub active: Option<ActiveSession>,
    pub last_activity: Instant,
}

impl Room {
    fn new(now: Instant) -> Self {
        Self {
            agents: BTreeMap::new(),
            occupied: BTreeSet::new(),
            observers: BTreeSet::new(),
            pending: None,
            active: None,
            last_activity: now,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        if self.active.is_some() {
            RoomPhase::Dispatching
        } else if self.pending.is_some() {
            RoomPhase::ReadinessPending
        } else {
            RoomPhase::Idle
        }
    }

    /// The live connection registered for `slot`, if any.
    pub fn agent_for(&self, slot: Slot) -> Option<ConnId> {
        self.agents
            .iter()
            .find(|(_, agent)| agent.slot == slot)
            .map(|(conn, _)| *conn)
    }

    pub fn slot_of(&self, conn: ConnId) -> Option<Slot> {
        self.agents.get(&conn).map(|a| a.slot)
    }

    pub fn connected(&self) -> ConnectedSlots {
        let mut status = ConnectedSlots::default();
        for agent in self.agents.values() {
            status.set(agent.slot, true);
        }
        status
    }

    /// Every connection that receives status broadcasts, without duplicates.
    pub fn status_audience(&self) -> BTreeSet<ConnId> {
        self.observers
            .iter()
            .copied()
            .chain(self.agents.keys().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
            && self.occupied.is_empty()
            && self.observers.is_empty()
            && self.pending.is_none()
            && self.active.is_none()
    }
}

/// Per-connection bookkeeping, independent of any room.
#[derive(Debug, Clone, Default)]
pub struct Peer {
    pub identity: Option<Identity>,
    /// Slot handed out by `requestAssignment` but not yet confirmed.
    pub provisional: Option<Slot>,
}

/// All rooms and open connections owned by the coordinator.
#[derive(Debug, Default)]
pub struct RegistryState {
    rooms: HashMap<Identity, Room>,
    peers: HashMap<ConnId, Peer>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup-or-insert. Never fails.
    pub fn room_mut(&mut self, identity: &Identity, now: Instant) -> &mut Room {
        self.rooms
            .entry(identity.clone())
            .or_insert_with(|| Room::new(now))
    }

    pub fn room(&self, identity: &Identity) -> Option<&Room> {
        self.rooms.get(identity)
    }

    pub fn rooms_mut(&mut self) -> impl Iterator<Item = (&Identity, &mut Room)> {
        self.rooms.iter_mut()
    }

    pub fn room_ids(&self) -> Vec<Identity> {
        self.rooms.keys().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn insert_peer(&mut self, conn: ConnId, identity: Identity) {
        self.peers.insert(
            conn,
            Peer {
                identity: Some(identity),
                provisional: None,
            },
        );
    }

    pub fn peer(&self, conn: ConnId) -> Option<&Peer> {
        self.peers.get(&conn)
    }

    pub fn peer_mut(&mut self, conn: ConnId) -> Option<&mut Peer> {
        self.peers.get_mut(&conn)
    }

    pub fn is_open(&self, conn: ConnId) -> bool {
        self.peers.contains_key(&conn)
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Drop a connection everywhere and free any slot it held.
    ///
    /// Returns the room it belonged to and the slot it had registered, if any.
    pub fn remove_peer(&mut self, conn: ConnId) -> Option<(Identity, Option<Slot>)> {
        let peer = self.peers.remove(&conn)?;
        let identity = peer.identity?;
        let room = self.rooms.get_mut(&identity)?;

        room.observers.remove(&conn);
        let registered = room.agents.remove(&conn).map(|agent| agent.slot);
        if let Some(slot) = registered {
            room.occupied.remove(&slot);
        }
        if let Some(slot) = peer.provisional {
            room.occupied.remove(&slot);
        }
        Some((identity, registered))
    }

    /// Drop empty rooms idle since before `now - ttl`. Returns how many went.
    pub fn reap_idle(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|id, room| {
            let stale = room.is_empty() && now.duration_since(room.last_activity) > ttl;
            if stale {
                tracing::info!(room = %id, "Reaping idle room");
            }
            !stale
        });
        before - self.rooms.len()
    }
}
