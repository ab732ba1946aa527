//! Season/episode navigation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::media::MediaRef;

/// Episode counts per season of one series
///
/// Season 0 (specials) is never entered by navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeasonCatalog {
    seasons: BTreeMap<u32, u32>,
}

impl SeasonCatalog {
    pub fn new(seasons: impl IntoIterator<Item = (u32, u32)>) -> Self {
        Self {
            seasons: seasons.into_iter().collect(),
        }
    }

    pub fn episode_count(&self, season: u32) -> Option<u32> {
        self.seasons.get(&season).copied()
    }

    fn next_season_after(&self, season: u32) -> Option<u32> {
        self.seasons
            .range(season.saturating_add(1)..)
            .find(|(s, count)| **s > season && **count > 0)
            .map(|(s, _)| *s)
    }

    fn previous_season_before(&self, season: u32) -> Option<(u32, u32)> {
        if season <= 1 {
            return None;
        }
        self.seasons
            .range(1..season)
            .rev()
            .find(|(_, count)| **count > 0)
            .map(|(s, count)| (*s, *count))
    }
}

/// Position within a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCursor {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeCursor {
    pub fn new(season: u32, episode: u32) -> Self {
        Self { season, episode }
    }

    /// Cursor of a series reference; `None` for movies
    pub fn of(media: &MediaRef) -> Option<Self> {
        media
            .season_episode()
            .map(|(season, episode)| Self { season, episode })
    }

    /// Episode that follows this one
    ///
    /// Without a catalog this is simply `episode + 1`. With one, the last
    /// episode of a season rolls into the first episode of the next season,
    /// and the last episode of the final season has no successor.
    pub fn next(&self, catalog: Option<&SeasonCatalog>) -> Option<Self> {
        let Some(catalog) = catalog else {
            return Some(Self::new(self.season, self.episode + 1));
        };

        match catalog.episode_count(self.season) {
            Some(count) if self.episode < count => Some(Self::new(self.season, self.episode + 1)),
            Some(_) => catalog
                .next_season_after(self.season)
                .map(|season| Self::new(season, 1)),
            None => Some(Self::new(self.season, self.episode + 1)),
        }
    }

    /// Episode before this one, crossing back into the previous season
    pub fn previous(&self, catalog: Option<&SeasonCatalog>) -> Option<Self> {
        if self.episode > 1 {
            return Some(Self::new(self.season, self.episode - 1));
        }
        catalog?
            .previous_season_before(self.season)
            .map(|(season, count)| Self::new(season, count))
    }

    pub fn apply_to(&self, media: &MediaRef) -> MediaRef {
        media.with_episode(self.season, self.episode)
    }
}
