//! Playback session controller
//!
//! A session owns one embedded player frame. Given a selected title it
//! decides which embed URL to load, follows playback through the frame's
//! messages, persists resume state, and walks the provider domain rings when
//! a load fails.
//!
//! The controller is a transition function: it consumes one
//! [`SessionEvent`] at a time and answers with [`SessionEffect`]s for its
//! driver to carry out. Two drivers exist: [`VirtualScheduler`] runs on
//! virtual time (tests, log replay), [`SessionRuntime`] runs on tokio.

mod controller;
mod episode;
mod runtime;
mod scheduler;
mod timer;

pub use controller::{Countdown, SessionController, SessionState};
pub use episode::{EpisodeCursor, SeasonCatalog};
pub use runtime::{EmbedFrame, SessionHandle, SessionRuntime};
pub use scheduler::VirtualScheduler;
pub use timer::{TimerKind, TimerSet, TimerToken};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::embed::ControlMessage;
use crate::media::MediaRef;
use crate::provider::ProviderId;

/// Coarse state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing selected
    #[default]
    Idle,
    /// Frame pointed at an embed URL, no success signal yet
    Loading,
    /// First success signal received
    Ready,
    Playing,
    Paused,
    /// Player reported the end of the title
    Ended,
    /// The current load failed
    Error,
    /// Picking another domain or provider after a failure
    Recovering,
}

/// Why a load was considered failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LoadFailure {
    /// No success signal before the load deadline
    Timeout,
    /// The frame itself failed to load
    Transport(String),
    /// The provider loaded but had no playable source
    NoSources,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::Timeout => f.write_str("Connection Error: player did not respond"),
            LoadFailure::Transport(reason) => write!(f, "Connection Error: {}", reason),
            LoadFailure::NoSources => f.write_str("Connection Error: no sources available"),
        }
    }
}

/// Input to the controller
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Play a title; `manual` when the user picked it explicitly
    Select {
        media: MediaRef,
        #[serde(default)]
        manual: bool,
    },

    /// Raw cross-frame message and the origin it came from
    Frame { origin: String, payload: Value },

    /// The frame reported a load error
    LoadFailed { reason: String },

    /// The provider loaded but reported no sources
    NoSources,

    /// A timer scheduled through [`SessionEffect::Schedule`] came due
    #[serde(skip)]
    TimerFired { kind: TimerKind, token: TimerToken },

    /// User asked to retry after an error
    Retry,

    /// User picked a provider explicitly
    SwitchProvider { provider: ProviderId },

    /// User dismissed the next-episode countdown
    CancelCountdown,

    /// Episode counts of the current series, for next-episode rollover
    Catalog { catalog: SeasonCatalog },

    /// Player control from the UI
    Control { message: ControlMessage },

    /// Session closed or navigated away
    Close,
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEffect {
    /// Point the frame at a new URL
    Load { url: String },

    /// Post a control message into the frame
    Post(ControlMessage),

    /// Deliver `TimerFired { kind, token }` after `after`
    Schedule {
        kind: TimerKind,
        token: TimerToken,
        after: Duration,
    },

    /// Drop the pending timer of `kind`
    Cancel { kind: TimerKind },

    /// Something the UI should reflect
    Notify(SessionNotice),
}

/// UI-facing notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum SessionNotice {
    PhaseChanged { phase: SessionPhase },
    Failed { error: LoadFailure },
    ProviderSwitched { provider: ProviderId, domain: String },
    DomainAdvanced { provider: ProviderId, domain: String, attempt: u32 },
    Countdown { remaining: u32, next: MediaRef },
    CountdownCancelled,
    IntroSkipped { to: f64 },
    EpisodeChanged { media: MediaRef },
}
