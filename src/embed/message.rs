//! Cross-frame messages exchanged with the embedded player
//!
//! Inbound: `{ "type": "PLAYER_EVENT", "data": { "event": ..., "currentTime": ..., ... } }`,
//! delivered either as a JSON object or as a string holding that JSON.
//! Anything else is not ours and is dropped without complaint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::media::{MediaId, MediaKind};

const PLAYER_EVENT: &str = "PLAYER_EVENT";

/// Playback event name reported by the embedded player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerEventKind {
    Play,
    Pause,
    Timeupdate,
    Ended,
    Seeked,
}

impl PlayerEventKind {
    /// Proof that the frame loaded and the player is running
    pub fn signals_ready(&self) -> bool {
        matches!(self, PlayerEventKind::Play | PlayerEventKind::Timeupdate)
    }

    /// Events whose progress is written without throttling
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlayerEventKind::Pause | PlayerEventKind::Ended | PlayerEventKind::Seeked
        )
    }
}

/// Payload of a `PLAYER_EVENT` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEvent {
    pub event: PlayerEventKind,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub current_time: f64,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub duration: f64,
    #[serde(default)]
    pub id: Option<MediaId>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: Value,
}

/// Decode a raw frame message, `None` if it is not a well-formed player event
pub fn decode_player_event(payload: &Value) -> Option<PlayerEvent> {
    let owned;
    let payload = match payload {
        Value::String(raw) => {
            owned = serde_json::from_str::<Value>(raw).ok()?;
            &owned
        }
        other => other,
    };

    let envelope = Envelope::deserialize(payload).ok()?;
    if envelope.kind != PLAYER_EVENT {
        return None;
    }
    PlayerEvent::deserialize(&envelope.data).ok()
}

/// Seconds as a number or numeric string; anything else reads as zero
fn lenient_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let seconds = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(if seconds.is_finite() && seconds >= 0.0 { seconds } else { 0.0 })
}

/// Argument of the toggle commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Toggle,
}

/// Command posted to the embedded player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "SEEK")]
    Seek { seconds: f64 },

    #[serde(rename = "PLAY_PAUSE")]
    PlayPause { action: ToggleAction },

    #[serde(rename = "MUTE_TOGGLE")]
    MuteToggle { action: ToggleAction },

    #[serde(rename = "SET_PLAYBACK_SPEED")]
    SetPlaybackSpeed { speed: f64 },
}

impl ControlMessage {
    pub fn seek(seconds: f64) -> Self {
        ControlMessage::Seek { seconds }
    }

    pub fn toggle_play() -> Self {
        ControlMessage::PlayPause {
            action: ToggleAction::Toggle,
        }
    }

    pub fn toggle_mute() -> Self {
        ControlMessage::MuteToggle {
            action: ToggleAction::Toggle,
        }
    }

    pub fn speed(speed: f64) -> Self {
        ControlMessage::SetPlaybackSpeed { speed }
    }

    pub fn to_json(&self) -> Value {
        // a tagged enum of plain fields always serializes
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
