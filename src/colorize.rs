//! Pay-per-page colorization.
//!
//! A page is fetched, sent to the image backend together with a fixed
//! instruction, and the result is cached for the signed-in identity. The
//! colorization cost is deducted only once a colorized image is in hand.
//!
//! Both the per-page guard and the deduction run under claims on the
//! shared state, so they hold across workflows and processes that use
//! the same state directory.

use crate::catalog::Page;
use crate::error::{ColorizeError, StoreError};
use crate::generative::GenerativeBackend;
use crate::images::{DataUri, ImageSource};
use crate::store::{
    AuthStore, CREDITS_KEY, CachedPage, Claim, ColorizationCache, CreditStore, Credits, State,
};
use std::sync::Arc;
use std::time::Duration;

/// Instruction sent with every page.
pub const COLORIZE_INSTRUCTION: &str = "You are an expert manga colorist. Colorize this black and white manga panel. \
Do not alter, redraw, or change any of the existing line art or the original artistic style. \
Only add color to the existing drawing. \
Output only the colorized image, with no text or description.";

/// What a reader should see for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageImage {
    /// The catalog's own image reference.
    Original(String),
    /// A colorization is underway.
    Colorizing,
    /// The cached colorized image, as a data URI.
    Colorized(String),
}

/// How often, and how long apart, a charge tries to take the credit claim.
const CREDIT_CLAIM_ATTEMPTS: u32 = 100;
const CREDIT_CLAIM_RETRY: Duration = Duration::from_millis(20);

/// Runs colorizations for whoever is signed in.
#[derive(Clone)]
pub struct ColorizeWorkflow {
    state: State,
    auth: AuthStore,
    credits: CreditStore,
    cost: Credits,
    images: Arc<dyn ImageSource>,
    backend: Arc<dyn GenerativeBackend>,
}

impl ColorizeWorkflow {
    pub fn new(
        state: State,
        credits: CreditStore,
        cost: Credits,
        images: Arc<dyn ImageSource>,
        backend: Arc<dyn GenerativeBackend>,
    ) -> Self {
        Self {
            auth: AuthStore::new(state.clone()),
            state,
            credits,
            cost,
            images,
            backend,
        }
    }

    pub fn cost(&self) -> Credits {
        self.cost
    }

    /// Colorizes one page of `book_id` and caches the result.
    ///
    /// Guard failures (no identity, page already running, balance short)
    /// change nothing. On any later failure the in-progress marker is
    /// removed and no credit is spent.
    pub async fn colorize(&self, book_id: &str, page: &Page) -> Result<DataUri, ColorizeError> {
        let identity = self.auth.current()?.ok_or(ColorizeError::AuthRequired)?;
        let cache = ColorizationCache::new(self.state.clone(), &identity.id, book_id);

        let _claim = self
            .state
            .claim(&page_claim(&cache, page.number))?
            .ok_or(ColorizeError::AlreadyInProgress { page: page.number })?;

        let balance = self.credits.balance()?;
        if balance < self.cost {
            return Err(ColorizeError::InsufficientCredit {
                balance,
                cost: self.cost,
            });
        }

        cache.mark_in_progress(page.number)?;
        tracing::info!(book_id, page = page.number, "colorizing page");

        let outcome = self.run(&cache, page).await;
        match &outcome {
            Ok(_) => tracing::info!(book_id, page = page.number, "page colorized"),
            Err(e) => {
                tracing::warn!(book_id, page = page.number, error = %e, "colorization failed");
                if let Err(cleanup) = cache.remove(page.number) {
                    tracing::warn!(error = %cleanup, "could not clear in-progress marker");
                }
            }
        }
        outcome
    }

    async fn run(&self, cache: &ColorizationCache, page: &Page) -> Result<DataUri, ColorizeError> {
        let original = self.images.fetch(&page.url).await?;
        let colorized = self
            .backend
            .colorize_image(&original, COLORIZE_INSTRUCTION)
            .await?;
        self.charge().await?;
        cache
            .store_ready(page.number, colorized.to_string())
            .map_err(ColorizeError::CacheWrite)?;
        Ok(colorized)
    }

    /// Deducts the cost, re-checking the balance under the credit claim.
    async fn charge(&self) -> Result<Credits, ColorizeError> {
        let _claim = self.claim_credits().await?;
        match self.credits.deduct(self.cost)? {
            Some(balance) => Ok(balance),
            None => Err(ColorizeError::InsufficientCredit {
                balance: self.credits.balance()?,
                cost: self.cost,
            }),
        }
    }

    async fn claim_credits(&self) -> Result<Claim, StoreError> {
        for _ in 0..CREDIT_CLAIM_ATTEMPTS {
            if let Some(claim) = self.state.claim(CREDITS_KEY)? {
                return Ok(claim);
            }
            tokio::time::sleep(CREDIT_CLAIM_RETRY).await;
        }
        Err(StoreError::Locked(CREDITS_KEY.to_string()))
    }

    /// Read and revert access to the same cache.
    pub fn view(&self) -> ColorizedView {
        ColorizedView::new(self.state.clone())
    }
}

/// Claim name guarding one page of one identity's cache.
fn page_claim(cache: &ColorizationCache, page: u32) -> String {
    format!("{}:{}", cache.key(), page)
}

/// The signed-in identity's colorized pages, without the ability to make
/// new ones.
#[derive(Clone)]
pub struct ColorizedView {
    state: State,
    auth: AuthStore,
}

impl ColorizedView {
    pub fn new(state: State) -> Self {
        Self {
            auth: AuthStore::new(state.clone()),
            state,
        }
    }

    /// Drops a page's cached colorization. Succeeds when there is none or
    /// nobody is signed in.
    pub fn revert(&self, book_id: &str, page_number: u32) -> Result<(), StoreError> {
        let Some(identity) = self.auth.current()? else {
            return Ok(());
        };
        ColorizationCache::new(self.state.clone(), &identity.id, book_id).remove(page_number)
    }

    /// The image to show for `page` of `book_id`.
    pub fn page_view(&self, book_id: &str, page: &Page) -> Result<PageImage, StoreError> {
        let Some(identity) = self.auth.current()? else {
            return Ok(PageImage::Original(page.url.clone()));
        };
        let cache = ColorizationCache::new(self.state.clone(), &identity.id, book_id);
        Ok(match cache.get(page.number)? {
            Some(CachedPage::Ready { image }) => PageImage::Colorized(image),
            Some(CachedPage::InProgress) => PageImage::Colorizing,
            None => PageImage::Original(page.url.clone()),
        })
    }
}
