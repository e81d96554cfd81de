//! Eaders - a manga reader.
//!
//! This library provides:
//! - Catalog access against a Komga-compatible server, with built-in fixtures
//! - Persisted reader state (identity, bookmarks, ratings, unlocks, credit)
//! - Pay-per-page colorization and synopsis rewriting via a generative model
//! - An image relay that re-serves remote page images with CORS headers

pub mod catalog;
pub mod colorize;
pub mod config;
pub mod console;
pub mod error;
pub mod generative;
pub mod images;
pub mod logging;
pub mod relay;
pub mod session;
pub mod store;
pub mod synopsis;

// Re-export commonly used types
pub use catalog::{Book, Catalog, CatalogSource, Page, Series, SeriesFilter};
pub use colorize::{ColorizeWorkflow, ColorizedView, PageImage};
pub use config::Config;
pub use console::Console;
pub use error::{
    CatalogError, ColorizeError, ConfigError, GenerativeError, RelayError, SessionError,
    StoreError,
};
pub use generative::{GeminiClient, GenerativeBackend};
pub use images::{DataUri, ImageFetcher, ImageSource, UpstreamAuth};
pub use session::{RatingSummary, Session};
pub use store::{Credits, FeedbackEntry, Identity, State};
pub use synopsis::SynopsisEnhancer;
