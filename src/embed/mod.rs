//! Embedded third-party player: URL contract and cross-frame messages

mod message;
mod url_builder;

pub use message::{decode_player_event, ControlMessage, PlayerEvent, PlayerEventKind, ToggleAction};
pub use url_builder::{plan_resume, EmbedOptions, ResumePlan, ResumePolicy, UrlBuilder};
