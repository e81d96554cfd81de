//! Bookmarked series.

use super::{State, StoreName};
use crate::error::StoreError;
use std::collections::BTreeMap;

/// Slot holding the bookmark set.
pub const BOOKMARKS_KEY: &str = "eaders-bookmarks";

/// Repository for the bookmark set.
///
/// Stored as a map of series id to `true`; a missing or `false` entry
/// means not bookmarked.
#[derive(Clone)]
pub struct BookmarkStore {
    state: State,
}

impl BookmarkStore {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    fn load(&self) -> Result<BTreeMap<String, bool>, StoreError> {
        Ok(self.state.load(BOOKMARKS_KEY)?.unwrap_or_default())
    }

    pub fn contains(&self, series_id: &str) -> Result<bool, StoreError> {
        Ok(self.load()?.get(series_id).copied().unwrap_or(false))
    }

    /// Bookmarked series ids, sorted.
    pub fn ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .filter_map(|(id, present)| present.then_some(id))
            .collect())
    }

    /// Sets membership explicitly.
    pub fn set(&self, series_id: &str, bookmarked: bool) -> Result<(), StoreError> {
        let mut bookmarks = self.load()?;
        if bookmarked {
            bookmarks.insert(series_id.to_string(), true);
        } else {
            bookmarks.remove(series_id);
        }
        self.state
            .save(StoreName::Bookmarks, BOOKMARKS_KEY, &bookmarks)
    }

    /// Flips membership and returns the new state.
    pub fn toggle(&self, series_id: &str) -> Result<bool, StoreError> {
        let bookmarked = !self.contains(series_id)?;
        self.set(series_id, bookmarked)?;
        Ok(bookmarked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_toggle_restores_membership() {
        let bookmarks = BookmarkStore::new(State::in_memory());
        bookmarks.set("series-2", true).unwrap();

        for id in ["series-1", "series-2"] {
            let before = bookmarks.contains(id).unwrap();
            bookmarks.toggle(id).unwrap();
            assert_ne!(bookmarks.contains(id).unwrap(), before);
            bookmarks.toggle(id).unwrap();
            assert_eq!(bookmarks.contains(id).unwrap(), before);
        }
    }

    #[test]
    fn test_ids_skip_false_entries() {
        let state = State::in_memory();
        let mut raw = BTreeMap::new();
        raw.insert("b".to_string(), true);
        raw.insert("a".to_string(), true);
        raw.insert("c".to_string(), false);
        state.save(StoreName::Bookmarks, BOOKMARKS_KEY, &raw).unwrap();

        let bookmarks = BookmarkStore::new(state);
        assert_eq!(bookmarks.ids().unwrap(), vec!["a", "b"]);
        assert!(!bookmarks.contains("c").unwrap());
    }

    #[test]
    fn test_repeated_set_is_idempotent() {
        let state = State::in_memory();
        let mut rx = state.bus().subscribe(StoreName::Bookmarks);
        let bookmarks = BookmarkStore::new(state);

        bookmarks.set("series-1", true).unwrap();
        bookmarks.set("series-1", true).unwrap();

        assert_eq!(bookmarks.ids().unwrap(), vec!["series-1"]);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
