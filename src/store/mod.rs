//! Persisted reader state.
//!
//! Seven independent stores (auth, bookmarks, ratings, unlocks, credits,
//! feedback and the colorization cache) share one key-value backend. Each store is a
//! typed repository that decodes its JSON blob at the boundary: anything
//! that fails to parse or validate is treated as absent.

mod auth;
mod backend;
mod bookmarks;
mod bus;
mod colorized;
mod credits;
mod feedback;
mod ratings;
mod unlocks;

pub use auth::{AUTH_KEY, AuthStore, Identity};
pub use backend::{FileStore, KeyValueStore, MemoryStore};
pub use bookmarks::{BOOKMARKS_KEY, BookmarkStore};
pub use bus::{ChangeBus, ChangeEvent, StoreName};
pub use colorized::{CachedPage, ColorizationCache};
pub use credits::{CREDITS_KEY, CreditStore, Credits};
pub use feedback::{FEEDBACK_KEY, FeedbackEntry, FeedbackStore};
pub use ratings::{RATINGS_KEY, RatingEntry, RatingLedger, RatingStore};
pub use unlocks::UnlockStore;

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A key-value backend plus the bus its writes are announced on.
#[derive(Clone)]
pub struct State {
    kv: Arc<dyn KeyValueStore>,
    bus: ChangeBus,
}

impl State {
    pub fn new(kv: Arc<dyn KeyValueStore>, bus: ChangeBus) -> Self {
        Self { kv, bus }
    }

    /// State over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), ChangeBus::new())
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Loads and decodes a slot.
    ///
    /// Malformed JSON is logged and reported as absent.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring malformed state slot");
                Ok(None)
            }
        }
    }

    /// Encodes and writes a whole slot, then publishes a change.
    ///
    /// Writing the text already stored is a no-op and publishes nothing.
    pub fn save<T: Serialize>(
        &self,
        store: StoreName,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(value)?;
        if self.kv.get(key)?.as_deref() == Some(encoded.as_str()) {
            return Ok(());
        }
        self.kv.set(key, &encoded)?;
        self.publish(store, key);
        Ok(())
    }

    /// Removes a slot and publishes a change if something was there.
    pub fn clear(&self, store: StoreName, key: &str) -> Result<(), StoreError> {
        if self.kv.get(key)?.is_none() {
            return Ok(());
        }
        self.kv.remove(key)?;
        self.publish(store, key);
        Ok(())
    }

    /// Takes the named claim for as long as the returned guard lives.
    ///
    /// `Ok(None)` when it is already held by anyone sharing this backend,
    /// in this process or another.
    pub fn claim(&self, name: &str) -> Result<Option<Claim>, StoreError> {
        if !self.kv.try_claim(name)? {
            return Ok(None);
        }
        Ok(Some(Claim {
            kv: Arc::clone(&self.kv),
            name: name.to_string(),
        }))
    }

    fn publish(&self, store: StoreName, key: &str) {
        self.bus.publish(ChangeEvent {
            store,
            key: key.to_string(),
        });
    }
}

/// A held claim, released on drop.
pub struct Claim {
    kv: Arc<dyn KeyValueStore>,
    name: String,
}

impl Drop for Claim {
    fn drop(&mut self) {
        if let Err(e) = self.kv.release(&self.name) {
            tracing::warn!(claim = %self.name, error = %e, "could not release claim");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_malformed_slot_reads_absent() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("eaders-bookmarks", "{not json").unwrap();
        let state = State::new(kv, ChangeBus::new());

        let loaded: Option<BTreeMap<String, bool>> = state.load("eaders-bookmarks").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_identical_save_publishes_once() {
        let state = State::in_memory();
        let mut rx = state.bus().subscribe(StoreName::Bookmarks);

        let mut value = BTreeMap::new();
        value.insert("s1".to_string(), true);
        state.save(StoreName::Bookmarks, "k", &value).unwrap();
        state.save(StoreName::Bookmarks, "k", &value).unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_claim_released_on_drop() {
        let state = State::in_memory();
        let other_handle = state.clone();

        let claim = state.claim("page-1").unwrap();
        assert!(claim.is_some());
        assert!(other_handle.claim("page-1").unwrap().is_none());

        drop(claim);
        assert!(other_handle.claim("page-1").unwrap().is_some());
    }

    #[test]
    fn test_clear_missing_is_silent() {
        let state = State::in_memory();
        let mut rx = state.bus().subscribe(StoreName::Colorized);

        state.clear(StoreName::Colorized, "nothing").unwrap();
        assert!(rx.try_recv().is_err());
    }
}
