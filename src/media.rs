//! Playable titles and their persisted watch state

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Catalog identifier of a title
///
/// Catalog APIs hand out both numeric and string ids; numbers are kept as
/// their decimal text so `603` and `"603"` name the same title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MediaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for MediaId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for MediaId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
            Float(f64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => MediaId(s),
            Raw::Int(n) => MediaId(n.to_string()),
            Raw::Float(n) if n.fract() == 0.0 => MediaId((n as i64).to_string()),
            Raw::Float(n) => MediaId(n.to_string()),
        })
    }
}

/// Movie or episodic series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    #[serde(rename = "movie")]
    Movie,
    #[serde(rename = "tv", alias = "series", alias = "show")]
    Series,
}

impl MediaKind {
    /// Path segment and storage key component
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaKind::Movie),
            "tv" | "series" | "show" => Ok(MediaKind::Series),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// A playable title, optionally pinned to an episode
///
/// Immutable once selected; the session replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: MediaId,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

impl MediaRef {
    pub fn movie(id: impl Into<MediaId>) -> Self {
        Self {
            id: id.into(),
            kind: MediaKind::Movie,
            season: None,
            episode: None,
        }
    }

    pub fn episode(id: impl Into<MediaId>, season: u32, episode: u32) -> Self {
        Self {
            id: id.into(),
            kind: MediaKind::Series,
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn is_series(&self) -> bool {
        self.kind == MediaKind::Series
    }

    /// Season and episode, defaulting a series to S1E1
    pub fn season_episode(&self) -> Option<(u32, u32)> {
        match self.kind {
            MediaKind::Movie => None,
            MediaKind::Series => Some((self.season.unwrap_or(1), self.episode.unwrap_or(1))),
        }
    }

    /// Same title, different episode
    pub fn with_episode(&self, season: u32, episode: u32) -> Self {
        Self {
            id: self.id.clone(),
            kind: self.kind,
            season: Some(season),
            episode: Some(episode),
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.season_episode() {
            Some((s, e)) => write!(f, "{}/{} S{:02}E{:02}", self.kind, self.id, s, e),
            None => write!(f, "{}/{}", self.kind, self.id),
        }
    }
}

/// Persisted playback position of one title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchProgress {
    pub id: MediaId,
    pub kind: MediaKind,
    #[serde(rename = "currentTime")]
    pub current_time_seconds: f64,
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    pub percent: f64,
    #[serde(rename = "lastWatched")]
    pub last_watched_at_epoch_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
}

impl WatchProgress {
    /// Build a record with `percent` derived from the position
    pub fn new(media: &MediaRef, current_time: f64, duration: f64, now_ms: i64) -> Self {
        let current_time = if current_time.is_finite() { current_time.max(0.0) } else { 0.0 };
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        Self {
            id: media.id.clone(),
            kind: media.kind,
            current_time_seconds: current_time,
            duration_seconds: duration,
            percent: percent_of(current_time, duration),
            last_watched_at_epoch_ms: now_ms,
            season: media.season,
            episode: media.episode,
        }
    }

    /// Recompute `percent` after the position fields changed
    pub fn normalize(&mut self) {
        self.percent = percent_of(self.current_time_seconds, self.duration_seconds);
    }
}

fn percent_of(current: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        current / duration * 100.0
    } else {
        0.0
    }
}

/// User-defined intro window of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntroMarkers {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl IntroMarkers {
    /// `None` unless `end > start`
    pub fn new(start_seconds: f64, end_seconds: f64) -> Option<Self> {
        (start_seconds.is_finite() && end_seconds.is_finite() && end_seconds > start_seconds)
            .then_some(Self {
                start_seconds,
                end_seconds,
            })
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.start_seconds && position < self.end_seconds
    }
}
