//! Colorized page cache, per identity and book.

use super::backend::encode_name;
use super::{State, StoreName};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State of one page in the cache. A page with no entry shows the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CachedPage {
    InProgress,
    Ready { image: String },
}

/// Repository for one identity's colorized pages of one book.
#[derive(Clone)]
pub struct ColorizationCache {
    state: State,
    key: String,
}

/// Escapes `-` on top of [`encode_name`], so an id never contains the
/// separator used between the user and book ids.
fn key_part(id: &str) -> String {
    encode_name(id).replace('-', "%2D")
}

impl ColorizationCache {
    pub fn new(state: State, user_id: &str, book_id: &str) -> Self {
        Self {
            state,
            key: format!("eaders-colorized-{}-{}", key_part(user_id), key_part(book_id)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// All cached pages keyed by page number.
    pub fn pages(&self) -> Result<BTreeMap<u32, CachedPage>, StoreError> {
        Ok(self.state.load(&self.key)?.unwrap_or_default())
    }

    pub fn get(&self, page: u32) -> Result<Option<CachedPage>, StoreError> {
        Ok(self.pages()?.remove(&page))
    }

    pub fn mark_in_progress(&self, page: u32) -> Result<(), StoreError> {
        self.put(page, CachedPage::InProgress)
    }

    pub fn store_ready(&self, page: u32, image: String) -> Result<(), StoreError> {
        self.put(page, CachedPage::Ready { image })
    }

    /// Drops a page's entry. Always succeeds for pages that have none.
    pub fn remove(&self, page: u32) -> Result<(), StoreError> {
        let mut pages = self.pages()?;
        if pages.remove(&page).is_none() {
            return Ok(());
        }
        if pages.is_empty() {
            self.state.clear(StoreName::Colorized, &self.key)
        } else {
            self.state.save(StoreName::Colorized, &self.key, &pages)
        }
    }

    fn put(&self, page: u32, entry: CachedPage) -> Result<(), StoreError> {
        let mut pages = self.pages()?;
        pages.insert(page, entry);
        self.state.save(StoreName::Colorized, &self.key, &pages)
    }
}
