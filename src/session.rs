//! Reader-facing actions over the persisted state.
//!
//! `Session` bundles the stores and applies the sign-in gating: bookmarking,
//! rating and feedback need an identity, unlocking and credit do not.

use crate::catalog::{Catalog, Series};
use crate::error::{SessionError, StoreError};
use crate::store::{
    AuthStore, BookmarkStore, CreditStore, Credits, FeedbackEntry, FeedbackStore, Identity,
    RatingEntry, RatingStore, State, UnlockStore,
};
use futures::future::join_all;

/// Ratings shown for a series.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u32,
    /// The signed-in reader's own score.
    pub your_rating: Option<u8>,
}

/// The reader's view of persisted state.
#[derive(Clone)]
pub struct Session {
    auth: AuthStore,
    bookmarks: BookmarkStore,
    ratings: RatingStore,
    unlocks: UnlockStore,
    feedback: FeedbackStore,
    credits: CreditStore,
    top_up_amount: Credits,
}

impl Session {
    pub fn new(state: State, credits: CreditStore, top_up_amount: Credits) -> Self {
        Self {
            auth: AuthStore::new(state.clone()),
            bookmarks: BookmarkStore::new(state.clone()),
            ratings: RatingStore::new(state.clone()),
            unlocks: UnlockStore::new(state.clone()),
            feedback: FeedbackStore::new(state),
            credits,
            top_up_amount,
        }
    }

    pub fn identity(&self) -> Result<Option<Identity>, StoreError> {
        self.auth.current()
    }

    pub fn login(&self, identity: Identity) -> Result<(), StoreError> {
        self.auth.login(identity)
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.auth.logout()
    }

    fn require_identity(&self) -> Result<Identity, SessionError> {
        self.auth.current()?.ok_or(SessionError::AuthRequired)
    }

    /// Flips a bookmark; returns whether the series is now bookmarked.
    pub fn toggle_bookmark(&self, series_id: &str) -> Result<bool, SessionError> {
        self.require_identity()?;
        Ok(self.bookmarks.toggle(series_id)?)
    }

    pub fn is_bookmarked(&self, series_id: &str) -> Result<bool, StoreError> {
        self.bookmarks.contains(series_id)
    }

    pub fn bookmarked_ids(&self) -> Result<Vec<String>, SessionError> {
        self.require_identity()?;
        Ok(self.bookmarks.ids()?)
    }

    /// Bookmarked series resolved against the catalog. Ids the catalog no
    /// longer knows are skipped.
    pub async fn bookmarked_series(&self, catalog: &Catalog) -> Result<Vec<Series>, SessionError> {
        let ids = self.bookmarked_ids()?;
        let lookups = ids.iter().map(|id| catalog.get_series(id));
        Ok(join_all(lookups).await.into_iter().flatten().collect())
    }

    /// Records the signed-in reader's score for a series.
    pub fn rate(&self, series_id: &str, score: u8) -> Result<RatingEntry, SessionError> {
        let identity = self.require_identity()?;
        if !(1..=5).contains(&score) {
            return Err(SessionError::InvalidScore(score));
        }
        Ok(self.ratings.submit(series_id, &identity.id, score)?)
    }

    /// Locally recorded ratings when there are any, else the series' own
    /// aggregate.
    pub fn rating_summary(&self, series: &Series) -> Result<RatingSummary, StoreError> {
        let entry = self.ratings.entry(&series.id)?.filter(|e| e.count > 0);
        let your_rating = match (&entry, self.auth.current()?) {
            (Some(entry), Some(identity)) => entry.user_ratings.get(&identity.id).copied(),
            _ => None,
        };
        Ok(match entry {
            Some(entry) => RatingSummary {
                average: entry.average(),
                count: entry.count,
                your_rating,
            },
            None => RatingSummary {
                average: series.average_rating,
                count: series.rating_count,
                your_rating,
            },
        })
    }

    pub fn unlock(&self, series_id: &str) -> Result<(), StoreError> {
        self.unlocks.unlock(series_id)
    }

    pub fn is_unlocked(&self, series_id: &str) -> Result<bool, StoreError> {
        self.unlocks.is_unlocked(series_id)
    }

    /// Premium series need unlocking before their chapters can be read.
    pub fn can_read(&self, series: &Series) -> Result<bool, StoreError> {
        if !series.premium {
            return Ok(true);
        }
        self.unlocks.is_unlocked(&series.id)
    }

    /// Records feedback from the signed-in reader. Blank text is refused.
    pub fn submit_feedback(&self, text: &str) -> Result<FeedbackEntry, SessionError> {
        self.require_identity()?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptyFeedback);
        }
        Ok(self.feedback.append(text)?)
    }

    pub fn balance(&self) -> Result<Credits, StoreError> {
        self.credits.balance()
    }

    /// Adds the configured top-up amount; returns the new balance.
    pub fn top_up(&self) -> Result<Credits, StoreError> {
        self.credits.top_up(self.top_up_amount)
    }
}
