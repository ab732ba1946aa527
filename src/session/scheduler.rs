//! Deterministic driver on virtual time
//!
//! Timers live in a queue ordered by due time; `advance` moves the manual
//! clock forward and fires whatever came due, in order. Loads and posts are
//! recorded instead of reaching a real frame.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::trace;

use super::controller::SessionController;
use super::timer::{TimerKind, TimerToken};
use super::{SessionEffect, SessionEvent, SessionNotice};
use crate::embed::ControlMessage;
use crate::storage::SharedStore;
use crate::utils::clock::{Clock, ManualClock};
use crate::utils::config::Config;

/// Session controller driven by a manual clock
pub struct VirtualScheduler {
    controller: SessionController,
    clock: Arc<ManualClock>,
    /// `(due_ms, sequence)` keeps equal deadlines in scheduling order
    queue: BTreeMap<(i64, u64), (TimerKind, TimerToken)>,
    sequence: u64,
    loads: Vec<String>,
    posts: Vec<ControlMessage>,
    notices: Vec<SessionNotice>,
}

impl VirtualScheduler {
    pub fn new(config: &Config, store: SharedStore, start_ms: i64) -> Self {
        let clock = Arc::new(ManualClock::new(start_ms));
        Self {
            controller: SessionController::new(config, store, clock.clone()),
            clock,
            queue: BTreeMap::new(),
            sequence: 0,
            loads: Vec::new(),
            posts: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Feed one event and carry out its effects
    pub fn dispatch(&mut self, event: SessionEvent) -> Vec<SessionEffect> {
        let effects = self.controller.handle(event);
        self.apply(&effects);
        effects
    }

    /// Move virtual time forward, firing every timer that comes due
    pub fn advance(&mut self, by: Duration) -> Vec<SessionEffect> {
        let target = self.clock.now_ms() + by.as_millis() as i64;
        let mut fired = Vec::new();

        while let Some((&(due, seq), _)) = self.queue.first_key_value() {
            if due > target {
                break;
            }
            let Some((kind, token)) = self.queue.remove(&(due, seq)) else {
                break;
            };
            self.clock.set(due);
            trace!("Virtual timer {:?} fired at {}", kind, due);
            fired.extend(self.dispatch(SessionEvent::TimerFired { kind, token }));
        }

        self.clock.set(target);
        fired
    }

    /// Timers still queued
    pub fn pending_timers(&self) -> usize {
        self.queue.len()
    }

    /// URLs the frame was pointed at, oldest first
    pub fn loads(&self) -> &[String] {
        &self.loads
    }

    pub fn last_load(&self) -> Option<&str> {
        self.loads.last().map(String::as_str)
    }

    pub fn posts(&self) -> &[ControlMessage] {
        &self.posts
    }

    pub fn notices(&self) -> &[SessionNotice] {
        &self.notices
    }

    fn apply(&mut self, effects: &[SessionEffect]) {
        for effect in effects {
            match effect {
                SessionEffect::Load { url } => self.loads.push(url.clone()),
                SessionEffect::Post(message) => self.posts.push(message.clone()),
                SessionEffect::Schedule { kind, token, after } => {
                    self.sequence += 1;
                    let due = self.clock.now_ms() + after.as_millis() as i64;
                    self.queue.insert((due, self.sequence), (*kind, *token));
                }
                SessionEffect::Cancel { kind } => self.queue.retain(|_, (k, _)| k != kind),
                SessionEffect::Notify(notice) => self.notices.push(notice.clone()),
            }
        }
    }
}
