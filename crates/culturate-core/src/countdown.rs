//! Cancellable countdowns
//!
//! Every wall-clock wait in a match is a `Countdown` of some `TimerKind`. The
//! reducers never read a clock: they ask for timers through effects and react
//! to `TimerExpired` inputs. `Timers` is the bookkeeping used by whoever owns a
//! clock (the room arbiter, the runtime tasks, tests).

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Named waits used by the round engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Per-round answer window
    AnswerWindow,
    /// Result/learning display between rounds
    ResultDisplay,
    /// Wait for the first queued challenge (AI match)
    InitialLoading,
    /// Challenge display window (AI match)
    Display,
    /// Pause between rounds (AI match)
    InterLoading,
    /// Delay before leaving a finished match
    GameOverRedirect,
    /// Fallback resync request when the server stays silent
    ResyncFallback,
    /// Delay between reconnect and rejoin
    Rejoin,
}

/// A single armed wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub kind: TimerKind,
    pub duration: Duration,
    pub deadline: Timestamp,
}

impl Countdown {
    pub fn start(kind: TimerKind, duration: Duration, now: Timestamp) -> Self {
        Self {
            kind,
            duration,
            deadline: now + duration.as_millis() as u64,
        }
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self, now: Timestamp) -> Duration {
        Duration::from_millis(self.deadline - now)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.deadline
    }

    /// Re-arm for another full period starting at `now`
    pub fn extend(&mut self, now: Timestamp) {
        self.deadline = now + self.duration.as_millis() as u64;
    }
}

/// At most one countdown per kind; arming a kind replaces its previous wait
#[derive(Debug, Clone, Default)]
pub struct Timers {
    armed: BTreeMap<TimerKind, Countdown>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: TimerKind, duration: Duration, now: Timestamp) {
        self.armed
            .insert(kind, Countdown::start(kind, duration, now));
    }

    pub fn cancel(&mut self, kind: TimerKind) -> Option<Countdown> {
        self.armed.remove(&kind)
    }

    pub fn cancel_all(&mut self) {
        self.armed.clear();
    }

    pub fn get(&self, kind: TimerKind) -> Option<&Countdown> {
        self.armed.get(&kind)
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.armed.values().map(|c| c.deadline).min()
    }

    /// Remove and return every expired countdown, earliest deadline first
    pub fn take_expired(&mut self, now: Timestamp) -> Vec<TimerKind> {
        let mut expired: Vec<Countdown> = self
            .armed
            .values()
            .filter(|c| c.is_expired(now))
            .copied()
            .collect();
        expired.sort_by_key(|c| c.deadline);
        for countdown in &expired {
            self.armed.remove(&countdown.kind);
        }
        expired.into_iter().map(|c| c.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
