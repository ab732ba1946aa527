//! Capped, most-recent-first title lists ("my list", "continue watching")

use serde::{Deserialize, Serialize};

use super::{read_json, write_json, SharedStore, KEY_PREFIX};
use crate::media::{MediaId, MediaKind, MediaRef};

/// One title in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub id: MediaId,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<u32>,
    pub added_at: i64,
}

impl CollectionEntry {
    pub fn new(media: &MediaRef, now_ms: i64) -> Self {
        Self {
            id: media.id.clone(),
            kind: media.kind,
            season: media.season,
            episode: media.episode,
            added_at: now_ms,
        }
    }

    pub fn media(&self) -> MediaRef {
        MediaRef {
            id: self.id.clone(),
            kind: self.kind,
            season: self.season,
            episode: self.episode,
        }
    }
}

/// A de-duplicated list of titles stored under one key
#[derive(Clone)]
pub struct MediaCollection {
    store: SharedStore,
    key: String,
    limit: usize,
}

impl MediaCollection {
    pub fn new(store: SharedStore, name: &str, limit: usize) -> Self {
        Self {
            store,
            key: format!("{}{}", KEY_PREFIX, name),
            limit: limit.max(1),
        }
    }

    pub fn my_list(store: SharedStore, limit: usize) -> Self {
        Self::new(store, "my-list", limit)
    }

    pub fn continue_watching(store: SharedStore, limit: usize) -> Self {
        Self::new(store, "continue-watching", limit)
    }

    pub fn list(&self) -> Vec<CollectionEntry> {
        read_json(self.store.as_ref(), &self.key).unwrap_or_default()
    }

    /// Put `media` at the front, dropping any older entry for the same title
    pub fn touch(&self, media: &MediaRef, now_ms: i64) {
        let mut entries = self.list();
        entries.retain(|e| !(e.id == media.id && e.kind == media.kind));
        entries.insert(0, CollectionEntry::new(media, now_ms));
        entries.truncate(self.limit);
        write_json(self.store.as_ref(), &self.key, &entries);
    }

    pub fn remove(&self, id: &MediaId, kind: MediaKind) -> bool {
        let mut entries = self.list();
        let before = entries.len();
        entries.retain(|e| !(e.id == *id && e.kind == kind));
        if entries.len() == before {
            return false;
        }
        write_json(self.store.as_ref(), &self.key, &entries)
    }

    pub fn contains(&self, id: &MediaId, kind: MediaKind) -> bool {
        self.list().iter().any(|e| e.id == *id && e.kind == kind)
    }

    /// Add if absent, remove if present; returns whether the title is now listed
    pub fn toggle(&self, media: &MediaRef, now_ms: i64) -> bool {
        if self.contains(&media.id, media.kind) {
            self.remove(&media.id, media.kind);
            false
        } else {
            self.touch(media, now_ms);
            true
        }
    }
}
