//! User-defined intro windows, one per series

use super::{read_json, write_json, SharedStore, KEY_PREFIX};
use crate::media::{IntroMarkers, MediaId};

#[derive(Clone)]
pub struct IntroStore {
    store: SharedStore,
}

impl IntroStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    fn key(id: &MediaId) -> String {
        format!("{}intro:{}", KEY_PREFIX, id)
    }

    /// Store a window; inverted or empty windows are dropped and `false` returned
    pub fn set(&self, id: &MediaId, start_seconds: f64, end_seconds: f64) -> bool {
        match IntroMarkers::new(start_seconds, end_seconds) {
            Some(markers) => write_json(self.store.as_ref(), &Self::key(id), &markers),
            None => false,
        }
    }

    pub fn get(&self, id: &MediaId) -> Option<IntroMarkers> {
        read_json::<IntroMarkers>(self.store.as_ref(), &Self::key(id))
            .filter(|m| m.end_seconds > m.start_seconds)
    }

    pub fn clear(&self, id: &MediaId) {
        if let Err(e) = self.store.remove(&Self::key(id)) {
            log::warn!("Failed to clear intro markers for {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_set_and_get() {
        let intro = IntroStore::new(MemoryStore::shared());
        assert!(intro.set(&"1399".into(), 60.0, 90.0));
        let m = intro.get(&"1399".into()).unwrap();
        assert_eq!((m.start_seconds, m.end_seconds), (60.0, 90.0));

        intro.clear(&"1399".into());
        assert!(intro.get(&"1399".into()).is_none());
    }

    #[test]
    fn test_invalid_window_rejected_silently() {
        let intro = IntroStore::new(MemoryStore::shared());
        assert!(intro.set(&"1399".into(), 60.0, 90.0));
        assert!(!intro.set(&"1399".into(), 90.0, 60.0));

        // previous value untouched
        assert_eq!(intro.get(&"1399".into()).unwrap().end_seconds, 90.0);
    }

    #[test]
    fn test_stored_inverted_window_ignored() {
        let raw = MemoryStore::shared();
        raw.set("flux:intro:7", "{\"startSeconds\":9,\"endSeconds\":3}".to_string())
            .unwrap();
        assert!(IntroStore::new(raw).get(&"7".into()).is_none());
    }
}
