//! Session-owned timers
//!
//! The controller never sleeps. It asks its driver to schedule a callback
//! and gets it back as [`SessionEvent::TimerFired`](super::SessionEvent)
//! carrying the token it was issued with. Each kind has at most one pending
//! timer; scheduling again or cancelling retires the old token, so a late
//! callback from a superseded timer is recognized and dropped.

use serde::Serialize;
use std::time::Duration;

use super::SessionEffect;

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Delay between player-ready and the deferred resume seek
    SeekSettle,
    /// Deadline for the first success signal after a load
    LoadTimeout,
    /// One step of the next-episode countdown
    CountdownTick,
    /// End of the manual-selection protection window
    ManualWindow,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::SeekSettle,
        TimerKind::LoadTimeout,
        TimerKind::CountdownTick,
        TimerKind::ManualWindow,
    ];

    fn slot(self) -> usize {
        match self {
            TimerKind::SeekSettle => 0,
            TimerKind::LoadTimeout => 1,
            TimerKind::CountdownTick => 2,
            TimerKind::ManualWindow => 3,
        }
    }
}

/// Identity of one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Pending timers of one session
#[derive(Debug, Default)]
pub struct TimerSet {
    next_token: u64,
    pending: [Option<TimerToken>; 4],
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `kind`, replacing any pending timer of the same kind
    pub fn schedule(&mut self, kind: TimerKind, after: Duration) -> Vec<SessionEffect> {
        let mut effects = Vec::with_capacity(2);
        effects.extend(self.cancel(kind));

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.pending[kind.slot()] = Some(token);
        effects.push(SessionEffect::Schedule { kind, token, after });
        effects
    }

    pub fn cancel(&mut self, kind: TimerKind) -> Option<SessionEffect> {
        self.pending[kind.slot()]
            .take()
            .map(|_| SessionEffect::Cancel { kind })
    }

    pub fn cancel_all(&mut self) -> Vec<SessionEffect> {
        TimerKind::ALL.iter().filter_map(|k| self.cancel(*k)).collect()
    }

    /// Consume a fired timer; `false` if the token is stale
    pub fn take_if_current(&mut self, kind: TimerKind, token: TimerToken) -> bool {
        let slot = &mut self.pending[kind.slot()];
        if *slot == Some(token) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending[kind.slot()].is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.iter().filter(|t| t.is_some()).count()
    }
}
