//! Per-title watch position

use log::{debug, info};

use super::{read_json, write_json, SharedStore, KEY_PREFIX};
use crate::media::{MediaId, MediaKind, MediaRef, WatchProgress};

/// Watch progress keyed by `(kind, id)`
///
/// Series keep a single record per show; season and episode travel in the
/// payload, so moving to another episode overwrites the same record.
#[derive(Clone)]
pub struct ProgressStore {
    store: SharedStore,
}

impl ProgressStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    fn key(kind: MediaKind, id: &MediaId) -> String {
        format!("{}progress:{}:{}", KEY_PREFIX, kind, id)
    }

    fn prefix() -> String {
        format!("{}progress:", KEY_PREFIX)
    }

    /// Upsert, overwriting any existing record
    pub fn save(&self, progress: &WatchProgress) -> bool {
        write_json(self.store.as_ref(), &Self::key(progress.kind, &progress.id), progress)
    }

    pub fn get(&self, id: &MediaId, kind: MediaKind) -> Option<WatchProgress> {
        read_json::<WatchProgress>(self.store.as_ref(), &Self::key(kind, id))
            .filter(|p| p.id == *id && p.kind == kind)
    }

    /// Move an existing series record to another episode without touching its position
    pub fn set_episode(&self, id: &MediaId, season: u32, episode: u32) {
        let Some(mut progress) = self.get(id, MediaKind::Series) else {
            debug!("No progress for tv/{}, episode update skipped", id);
            return;
        };
        progress.season = Some(season);
        progress.episode = Some(episode);
        self.save(&progress);
    }

    /// Start `media` from zero, keeping the last known duration
    pub fn reset(&self, media: &MediaRef, now_ms: i64) -> WatchProgress {
        let duration = self
            .get(&media.id, media.kind)
            .map(|p| p.duration_seconds)
            .unwrap_or(0.0);
        let progress = WatchProgress::new(media, 0.0, duration, now_ms);
        self.save(&progress);
        progress
    }

    /// Rewrite a record stored under a stale identifier
    ///
    /// Returns whether a record was moved. An existing record under `new`
    /// wins if it was watched more recently.
    pub fn migrate_id(&self, kind: MediaKind, old: &MediaId, new: &MediaId) -> bool {
        if old == new {
            return false;
        }
        let Some(mut progress) = self.get(old, kind) else {
            return false;
        };

        let keep_existing = self
            .get(new, kind)
            .is_some_and(|existing| existing.last_watched_at_epoch_ms > progress.last_watched_at_epoch_ms);

        if !keep_existing {
            progress.id = new.clone();
            if !self.save(&progress) {
                return false;
            }
        }

        if let Err(e) = self.store.remove(&Self::key(kind, old)) {
            log::warn!("Failed to drop migrated progress {}/{}: {}", kind, old, e);
        }
        info!("Migrated progress {}/{} -> {}", kind, old, new);
        true
    }

    /// Every readable record, most recently watched first
    pub fn all(&self) -> Vec<WatchProgress> {
        let keys = match self.store.keys(&Self::prefix()) {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("Failed to list progress: {}", e);
                return Vec::new();
            }
        };

        let mut records: Vec<WatchProgress> = keys
            .iter()
            .filter_map(|k| read_json(self.store.as_ref(), k))
            .collect();
        records.sort_by(|a, b| b.last_watched_at_epoch_ms.cmp(&a.last_watched_at_epoch_ms));
        records
    }
}
