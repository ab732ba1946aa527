//! Tokio driver for a live session
//!
//! One task owns the controller and reads events from an unbounded channel.
//! Timers are spawned sleeps that report back through a weak sender, so a
//! session whose handle is gone winds down on its own. Cancelling a timer
//! aborts its task.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controller::SessionController;
use super::timer::{TimerKind, TimerToken};
use super::{SessionEffect, SessionEvent, SessionNotice};
use crate::embed::ControlMessage;
use crate::utils::error::{FluxError, Result};

/// The embedded player frame the session drives
pub trait EmbedFrame: Send + 'static {
    /// Point the frame at `url`
    fn load(&mut self, url: &str);

    /// Post a control message into the frame
    fn post(&mut self, message: &ControlMessage);
}

/// Spawns session tasks
pub struct SessionRuntime;

impl SessionRuntime {
    /// Move `controller` onto a task driving `frame`
    pub fn spawn<F: EmbedFrame>(controller: SessionController, frame: F) -> SessionHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let worker = SessionWorker {
            controller,
            frame,
            events: events_rx,
            loopback: events_tx.downgrade(),
            notices: notices_tx,
            timers: HashMap::new(),
        };
        let task = tokio::spawn(worker.run());

        SessionHandle {
            events: events_tx,
            notices: notices_rx,
            task,
        }
    }
}

/// Caller side of a running session
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
    task: JoinHandle<SessionController>,
}

impl SessionHandle {
    pub fn send(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| FluxError::Session("session task has stopped".to_string()))
    }

    /// Next UI notice, `None` once the session is gone
    pub async fn next_notice(&mut self) -> Option<SessionNotice> {
        self.notices.recv().await
    }

    pub fn try_notice(&mut self) -> Option<SessionNotice> {
        self.notices.try_recv().ok()
    }

    /// Close the session and get the controller back
    pub async fn close(self) -> Result<SessionController> {
        // a send failure means the task already ended; joining still works
        let _ = self.events.send(SessionEvent::Close);
        drop(self.events);
        self.task
            .await
            .map_err(|e| FluxError::Session(format!("session task failed: {}", e)))
    }
}

struct SessionWorker<F> {
    controller: SessionController,
    frame: F,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    loopback: mpsc::WeakUnboundedSender<SessionEvent>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    timers: HashMap<TimerKind, JoinHandle<()>>,
}

impl<F: EmbedFrame> SessionWorker<F> {
    async fn run(mut self) -> SessionController {
        debug!("Session task started");

        while let Some(event) = self.events.recv().await {
            let closing = matches!(event, SessionEvent::Close);
            let effects = self.controller.handle(event);
            for effect in effects {
                self.apply(effect);
            }
            if closing {
                break;
            }
        }

        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        info!("Session task finished");
        self.controller
    }

    fn apply(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::Load { url } => self.frame.load(&url),
            SessionEffect::Post(message) => self.frame.post(&message),
            SessionEffect::Schedule { kind, token, after } => self.schedule(kind, token, after),
            SessionEffect::Cancel { kind } => {
                if let Some(timer) = self.timers.remove(&kind) {
                    timer.abort();
                }
            }
            SessionEffect::Notify(notice) => {
                // nobody listening is fine
                let _ = self.notices.send(notice);
            }
        }
    }

    fn schedule(&mut self, kind: TimerKind, token: TimerToken, after: Duration) {
        let loopback = self.loopback.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(events) = loopback.upgrade() {
                let _ = events.send(SessionEvent::TimerFired { kind, token });
            }
        });

        if let Some(previous) = self.timers.insert(kind, timer) {
            previous.abort();
        }
    }
}
