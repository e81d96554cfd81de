//! Per-series rating ledger.
//!
//! Each series keeps a running total, a count, and the last score each
//! reader submitted, so that re-rating replaces a reader's score rather
//! than adding a second one.

use super::{State, StoreName};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slot holding the rating ledger.
pub const RATINGS_KEY: &str = "eaders-manga-ratings";

/// Ratings for one series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingEntry {
    pub total_score: u32,
    pub count: u32,
    pub user_ratings: BTreeMap<String, u8>,
}

impl RatingEntry {
    /// Records `score` as `user_id`'s latest rating.
    pub fn submit(&mut self, user_id: &str, score: u8) {
        match self.user_ratings.get(user_id) {
            Some(&prior) => {
                self.total_score = self.total_score - u32::from(prior) + u32::from(score);
            }
            None => {
                self.total_score += u32::from(score);
                self.count += 1;
            }
        }
        self.user_ratings.insert(user_id.to_string(), score);
    }

    /// Mean score, 0 when nobody has rated.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            f64::from(self.total_score) / f64::from(self.count)
        }
    }

    /// Checks that total and count agree with the per-user scores.
    pub fn is_consistent(&self) -> bool {
        let sum: u32 = self.user_ratings.values().map(|&s| u32::from(s)).sum();
        self.total_score == sum && self.count as usize == self.user_ratings.len()
    }
}

/// All series' ratings keyed by series id.
pub type RatingLedger = BTreeMap<String, RatingEntry>;

/// Repository for the rating ledger.
#[derive(Clone)]
pub struct RatingStore {
    state: State,
}

impl RatingStore {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    /// Loads the ledger, dropping entries whose totals disagree with their
    /// per-user scores.
    pub fn ledger(&self) -> Result<RatingLedger, StoreError> {
        let mut ledger: RatingLedger = self.state.load(RATINGS_KEY)?.unwrap_or_default();
        ledger.retain(|series_id, entry| {
            let ok = entry.is_consistent();
            if !ok {
                tracing::warn!(series_id = %series_id, "discarding inconsistent rating entry");
            }
            ok
        });
        Ok(ledger)
    }

    pub fn entry(&self, series_id: &str) -> Result<Option<RatingEntry>, StoreError> {
        Ok(self.ledger()?.remove(series_id))
    }

    /// Applies a submission and returns the updated entry.
    pub fn submit(
        &self,
        series_id: &str,
        user_id: &str,
        score: u8,
    ) -> Result<RatingEntry, StoreError> {
        let mut ledger = self.ledger()?;
        let entry = ledger.entry(series_id.to_string()).or_default();
        entry.submit(user_id, score);
        let updated = entry.clone();
        self.state.save(StoreName::Ratings, RATINGS_KEY, &ledger)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeBus, KeyValueStore, MemoryStore};
    use std::sync::Arc;

    #[test]
    fn test_rerating_replaces_score() {
        let ratings = RatingStore::new(State::in_memory());

        ratings.submit("S1", "currentUser", 4).unwrap();
        let entry = ratings.submit("S1", "currentUser", 2).unwrap();

        assert_eq!(entry.count, 1);
        assert_eq!(entry.total_score, 2);
        assert_eq!(entry.average(), 2.0);
    }

    #[test]
    fn test_latest_scores_only() {
        let mut entry = RatingEntry::default();
        let submissions = [("a", 5), ("b", 3), ("a", 1), ("c", 4), ("b", 2), ("a", 3)];
        for (user, score) in submissions {
            entry.submit(user, score);
            assert!(entry.is_consistent());
        }

        // Latest: a=3, b=2, c=4
        assert_eq!(entry.count, 3);
        assert_eq!(entry.total_score, 9);
        assert_eq!(entry.average(), 3.0);
    }

    #[test]
    fn test_empty_average_is_zero() {
        assert_eq!(RatingEntry::default().average(), 0.0);
    }

    #[test]
    fn test_inconsistent_entry_discarded() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(
            RATINGS_KEY,
            r#"{"bad":{"totalScore":10,"count":1,"userRatings":{"u":3}},
               "good":{"totalScore":3,"count":1,"userRatings":{"u":3}}}"#,
        )
        .unwrap();
        let ratings = RatingStore::new(State::new(kv, ChangeBus::new()));

        let ledger = ratings.ledger().unwrap();
        assert!(ledger.contains_key("good"));
        assert!(!ledger.contains_key("bad"));
    }

    #[test]
    fn test_stored_field_names() {
        let kv = Arc::new(MemoryStore::new());
        let ratings = RatingStore::new(State::new(kv.clone(), ChangeBus::new()));
        ratings.submit("S1", "u", 5).unwrap();

        let raw = kv.get(RATINGS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"totalScore\":5"));
        assert!(raw.contains("\"userRatings\""));
    }
}
