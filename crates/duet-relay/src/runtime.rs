//! The relay task: one loop that owns the coordinator.
//!
//! Connection tasks and HTTP handlers never touch room state. They post
//! [`Event`]s through a [`RelayHandle`]; the loop applies each one to
//! completion, then hands the resulting frames to per-connection outlets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use duet_common::{ConnId, Identity, RelayError};
use duet_config::DuetConfig;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::coordinator::{ActionRequest, Coordinator, CoordinatorSettings, Outbound};
use crate::protocol::{ClientMessage, ConnectedSlots};
use crate::timer::{FiredTimer, TokioTimers};

const EVENT_QUEUE: usize = 1024;

/// What a connection task is told to do with its socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Frame(String),
    Close,
}

pub enum Event {
    Connected {
        conn: ConnId,
        identity: Identity,
        outlet: mpsc::Sender<Outgoing>,
    },
    Message {
        conn: ConnId,
        message: ClientMessage,
    },
    Disconnected {
        conn: ConnId,
    },
    Command(Command),
}

/// Control-API requests, answered over a oneshot.
pub enum Command {
    Pair {
        identity: Identity,
        request: ActionRequest,
        reply: oneshot::Sender<Result<String, RelayError>>,
    },
    Single {
        identity: Identity,
        request: ActionRequest,
        reply: oneshot::Sender<Result<(), RelayError>>,
    },
    CancelAll {
        identity: Identity,
        reply: oneshot::Sender<usize>,
    },
    Status {
        identity: Identity,
        reply: oneshot::Sender<ConnectedSlots>,
    },
    Health {
        reply: oneshot::Sender<HealthReport>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub rooms: usize,
    pub connections: usize,
}

/// Cheap, cloneable entry point into the relay task.
#[derive(Clone)]
pub struct RelayHandle {
    events: mpsc::Sender<Event>,
    next_conn: Arc<AtomicU64>,
}

impl RelayHandle {
    pub fn next_conn_id(&self) -> ConnId {
        ConnId(self.next_conn.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub async fn send(&self, event: Event) -> Result<(), RelayError> {
        self.events
            .send(event)
            .await
            .map_err(|_| RelayError::CoordinatorGone)
    }

    async fn ask<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::Command(build(reply))).await?;
        rx.await.map_err(|_| RelayError::CoordinatorGone)
    }

    pub async fn pair(
        &self,
        identity: Identity,
        request: ActionRequest,
    ) -> Result<String, RelayError> {
        self.ask(|reply| Command::Pair {
            identity,
            request,
            reply,
        })
        .await?
    }

    pub async fn single(
        &self,
        identity: Identity,
        request: ActionRequest,
    ) -> Result<(), RelayError> {
        self.ask(|reply| Command::Single {
            identity,
            request,
            reply,
        })
        .await?
    }

    pub async fn cancel_all(&self, identity: Identity) -> Result<usize, RelayError> {
        self.ask(|reply| Command::CancelAll { identity, reply }).await
    }

    pub async fn status(&self, identity: Identity) -> Result<ConnectedSlots, RelayError> {
        self.ask(|reply| Command::Status { identity, reply }).await
    }

    pub async fn health(&self) -> Result<HealthReport, RelayError> {
        self.ask(|reply| Command::Health { reply }).await
    }
}

pub struct Relay {
    coordinator: Coordinator<TokioTimers>,
    fired: mpsc::UnboundedReceiver<FiredTimer>,
    events: mpsc::Receiver<Event>,
    outlets: HashMap<ConnId, mpsc::Sender<Outgoing>>,
    heartbeat_every: Duration,
    reap_every: Duration,
}

impl Relay {
    /// Build the relay and its handle. Must be called inside a tokio runtime.
    pub fn new(config: &DuetConfig) -> (Self, RelayHandle) {
        let (timers, fired) = TokioTimers::new();
        let (tx, events) = mpsc::channel(EVENT_QUEUE);
        let relay = Self {
            coordinator: Coordinator::new(CoordinatorSettings::from_config(config), timers),
            fired,
            events,
            outlets: HashMap::new(),
            heartbeat_every: config.heartbeat.interval(),
            reap_every: config.reaper.interval(),
        };
        let handle = RelayHandle {
            events: tx,
            next_conn: Arc::new(AtomicU64::new(0)),
        };
        (relay, handle)
    }

    /// Run until every [`RelayHandle`] is dropped.
    pub async fn run(mut self) {
        let mut heartbeat =
            interval_at(Instant::now() + self.heartbeat_every, self.heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reaper = interval_at(Instant::now() + self.reap_every, self.reap_every);
        reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Relay loop started");
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.on_event(event),
                        None => break,
                    }
                }
                Some(fired) = self.fired.recv() => self.coordinator.on_timer(fired),
                _ = heartbeat.tick() => self.coordinator.heartbeat_tick(),
                _ = reaper.tick() => {
                    let removed = self.coordinator.reap();
                    debug!(removed, rooms = self.coordinator.state().room_count(), "Reaper tick");
                }
            }
            self.flush();
        }
        info!("Relay loop stopped");
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Connected {
                conn,
                identity,
                outlet,
            } => {
                self.outlets.insert(conn, outlet);
                self.coordinator.connect(conn, identity);
            }
            Event::Message { conn, message } => self.coordinator.handle_message(conn, message),
            Event::Disconnected { conn } => {
                self.outlets.remove(&conn);
                self.coordinator.disconnect(conn);
            }
            Event::Command(command) => self.on_command(command),
        }
    }

    fn on_command(&mut self, command: Command) {
        // A dropped reply receiver means the HTTP caller went away.
        match command {
            Command::Pair {
                identity,
                request,
                reply,
            } => {
                let _ = reply.send(self.coordinator.pair(&identity, request));
            }
            Command::Single {
                identity,
                request,
                reply,
            } => {
                let _ = reply.send(self.coordinator.dispatch_single(&identity, request));
            }
            Command::CancelAll { identity, reply } => {
                let _ = reply.send(self.coordinator.cancel_all(&identity));
            }
            Command::Status { identity, reply } => {
                let _ = reply.send(self.coordinator.connected(&identity));
            }
            Command::Health { reply } => {
                let state = self.coordinator.state();
                let _ = reply.send(HealthReport {
                    rooms: state.room_count(),
                    connections: state.connection_count(),
                });
            }
        }
    }

    /// Deliver queued frames. Delivery is best-effort: a full outlet drops
    /// the frame, a closed one is forgotten.
    fn flush(&mut self) {
        for out in self.coordinator.drain_outbound() {
            match out {
                Outbound::Send { to, message } => {
                    let Some(outlet) = self.outlets.get(&to) else {
                        continue;
                    };
                    match outlet.try_send(Outgoing::Frame(message.to_json())) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!(conn = %to, "Outbound queue full, dropping frame");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            self.outlets.remove(&to);
                        }
                    }
                }
                Outbound::Close { conn } => {
                    if let Some(outlet) = self.outlets.remove(&conn) {
                        let _ = outlet.try_send(Outgoing::Close);
                    }
                }
            }
        }
    }
}

/// Build the relay and spawn its loop.
pub fn spawn(config: &DuetConfig) -> RelayHandle {
    let (relay, handle) = Relay::new(config);
    tokio::spawn(relay.run());
    handle
}
