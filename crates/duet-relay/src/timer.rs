//! Schedulable, cancellable timers plus the clock they run on.
//!
//! The coordinator never sleeps. It asks a [`Timers`] implementation to fire
//! a [`TimerKind`] later and is handed the firing back as an ordinary event.
//! [`TokioTimers`] drives real time; [`ManualTimers`] lets tests advance a
//! virtual clock deterministically.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use duet_common::Identity;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// What a timer means when it fires. Each carries the bet id it was armed
/// for so a late firing against a newer bet is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    ReadinessTimeout { room: Identity, bet_id: String },
    DispatchTimeout { room: Identity, bet_id: String },
    SettleCleanup { room: Identity, bet_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub id: TimerId,
    pub kind: TimerKind,
}

pub trait Timers {
    fn now(&self) -> Instant;
    fn schedule(&mut self, after: Duration, kind: TimerKind) -> TimerId;
    /// Cancelling an unknown or already-fired timer is a no-op.
    fn cancel(&mut self, id: TimerId);
}

// ---------------------------------------------------------------------------
// Tokio-backed timers
// ---------------------------------------------------------------------------

/// Spawns one sleeping task per timer; firings arrive on the receiver
/// returned by [`TokioTimers::new`].
pub struct TokioTimers {
    next_id: u64,
    tasks: HashMap<TimerId, AbortHandle>,
    fired_tx: mpsc::UnboundedSender<FiredTimer>,
}

impl TokioTimers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredTimer>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timers = Self {
            next_id: 0,
            tasks: HashMap::new(),
            fired_tx,
        };
        (timers, fired_rx)
    }

    pub fn armed(&self) -> usize {
        self.tasks.len()
    }
}

impl Timers for TokioTimers {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&mut self, after: Duration, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(FiredTimer { id, kind });
        });
        self.tasks.insert(id, handle.abort_handle());
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.tasks.remove(&id) {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Virtual-time timers
// ---------------------------------------------------------------------------

/// Deterministic timers over a virtual clock. Nothing fires until
/// [`ManualTimers::advance`] moves the clock past a deadline.
pub struct ManualTimers {
    origin: Instant,
    elapsed: Duration,
    next_id: u64,
    pending: Vec<(Duration, TimerId, TimerKind)>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Move the clock forward and return every timer now due, earliest first.
    pub fn advance(&mut self, by: Duration) -> Vec<FiredTimer> {
        self.elapsed += by;
        let now = self.elapsed;
        let (mut due, rest): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|(deadline, _, _)| *deadline <= now);
        self.pending = rest;
        due.sort_by_key(|(deadline, id, _)| (*deadline, *id));
        due.into_iter()
            .map(|(_, id, kind)| FiredTimer { id, kind })
            .collect()
    }

    pub fn armed(&self) -> usize {
        self.pending.len()
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.pending.iter().any(|(_, t, _)| *t == id)
    }
}

impl Default for ManualTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl Timers for ManualTimers {
    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    fn schedule(&mut self, after: Duration, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.pending.push((self.elapsed + after, id, kind));
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.pending.retain(|(_, t, _)| *t != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readiness(bet: &str) -> TimerKind {
        TimerKind::ReadinessTimeout {
            room: Identity::new("alice"),
            bet_id: bet.into(),
        }
    }

    #[test]
    fn manual_fires_in_deadline_order() {
        let mut t = ManualTimers::new();
        let late = t.schedule(Duration::from_secs(10), readiness("late"));
        let early = t.schedule(Duration::from_secs(5), readiness("early"));

        assert!(t.advance(Duration::from_secs(4)).is_empty());
        let fired = t.advance(Duration::from_secs(7));
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].id, early);
        assert_eq!(fired[1].id, late);
        assert_eq!(t.armed(), 0);
    }

    #[test]
    fn manual_cancel_prevents_firing() {
        let mut t = ManualTimers::new();
        let id = t.schedule(Duration::from_secs(1), readiness("x"));
        assert!(t.is_armed(id));
        t.cancel(id);
        t.cancel(id);
        assert!(t.advance(Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn manual_clock_moves() {
        let mut t = ManualTimers::new();
        let start = t.now();
        t.advance(Duration::from_millis(1500));
        assert_eq!(t.now() - start, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_fires() {
        let (mut t, mut rx) = TokioTimers::new();
        let id = t.schedule(Duration::from_secs(5), readiness("x"));
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, id);
        assert_eq!(fired.kind, readiness("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_cancel() {
        let (mut t, mut rx) = TokioTimers::new();
        let cancelled = t.schedule(Duration::from_secs(1), readiness("a"));
        let kept = t.schedule(Duration::from_secs(2), readiness("b"));
        t.cancel(cancelled);
        assert_eq!(t.armed(), 1);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, kept);
    }
}
