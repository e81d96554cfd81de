//! Premium series unlocked by a rewarded ad.
//!
//! One slot per series. Once set, a flag is never cleared.

use super::{State, StoreName};
use crate::error::StoreError;

fn unlock_key(series_id: &str) -> String {
    format!("series-{}-unlocked", series_id)
}

/// Repository for per-series unlock flags.
#[derive(Clone)]
pub struct UnlockStore {
    state: State,
}

impl UnlockStore {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    pub fn is_unlocked(&self, series_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .load::<bool>(&unlock_key(series_id))?
            .unwrap_or(false))
    }

    pub fn unlock(&self, series_id: &str) -> Result<(), StoreError> {
        self.state
            .save(StoreName::Unlocks, &unlock_key(series_id), &true)
    }
}
