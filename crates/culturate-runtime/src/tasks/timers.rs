//! Tokio-backed countdowns for the engine tasks

use culturate_core::TimerKind;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// At most one pending deadline per timer kind
#[derive(Debug, Default)]
pub struct TimerSet {
    deadlines: BTreeMap<TimerKind, Instant>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) `kind` to fire after `duration`
    pub fn arm(&mut self, kind: TimerKind, duration: Duration) {
        debug!(?kind, ?duration, "Timer armed");
        self.deadlines.insert(kind, Instant::now() + duration);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if self.deadlines.remove(&kind).is_some() {
            debug!(?kind, "Timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    fn earliest(&self) -> Option<(TimerKind, Instant)> {
        self.deadlines
            .iter()
            .min_by_key(|(_, deadline)| **deadline)
            .map(|(kind, deadline)| (*kind, *deadline))
    }

    /// Wait for the earliest deadline and disarm it
    ///
    /// Pends forever while nothing is armed. Cancel-safe: a dropped wait leaves
    /// the deadline armed.
    pub async fn expired(&mut self) -> TimerKind {
        match self.earliest() {
            Some((kind, deadline)) => {
                sleep_until(deadline).await;
                self.deadlines.remove(&kind);
                kind
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_earliest_fires_first() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::ResultDisplay, Duration::from_secs(8));
        timers.arm(TimerKind::AnswerWindow, Duration::from_secs(3));

        assert_eq!(timers.expired().await, TimerKind::AnswerWindow);
        assert!(!timers.is_armed(TimerKind::AnswerWindow));
        assert_eq!(timers.expired().await, TimerKind::ResultDisplay);
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_deadline() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::Display, Duration::from_secs(1));
        timers.arm(TimerKind::Display, Duration::from_secs(10));
        timers.arm(TimerKind::InterLoading, Duration::from_secs(5));
        assert_eq!(timers.len(), 2);
        assert_eq!(timers.expired().await, TimerKind::InterLoading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_armed_pends() {
        let mut timers = TimerSet::new();
        let waited = tokio::time::timeout(Duration::from_secs(60), timers.expired()).await;
        assert!(waited.is_err());
    }
}
