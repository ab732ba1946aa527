//! fluxplayer: session controller for third-party embedded video players
//!
//! Builds provider embed URLs, follows playback through the player's
//! cross-frame messages, keeps resume progress in a key-value store and
//! falls back across provider domains when a load fails.

pub mod embed;
pub mod media;
pub mod provider;
pub mod session;
pub mod storage;
pub mod utils;

pub use media::{IntroMarkers, MediaId, MediaKind, MediaRef, WatchProgress};
pub use session::{SessionController, SessionEffect, SessionEvent, SessionNotice, SessionPhase};
pub use utils::{Config, FluxError, Result};
