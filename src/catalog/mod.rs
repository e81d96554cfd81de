//! Catalog access: series, books and pages.
//!
//! This module defines the interface every catalog source implements,
//! the common data types, and the `Catalog` facade that prefers the
//! external source and falls back to the built-in fixtures when it cannot
//! answer. An entity the external source does not have stays absent.

mod fixtures;
mod remote;

pub use fixtures::FixtureCatalog;
pub use remote::RemoteCatalog;

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Publication status of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeriesStatus {
    #[default]
    Ongoing,
    Ended,
    Hiatus,
    Abandoned,
    Completed,
}

impl std::fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SeriesStatus::Ongoing => "Ongoing",
            SeriesStatus::Ended => "Ended",
            SeriesStatus::Hiatus => "Hiatus",
            SeriesStatus::Abandoned => "Abandoned",
            SeriesStatus::Completed => "Completed",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for SeriesStatus {
    type Err = std::convert::Infallible;

    /// Unknown statuses read as ongoing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_uppercase().as_str() {
            "ENDED" => Self::Ended,
            "HIATUS" => Self::Hiatus,
            "ABANDONED" => Self::Abandoned,
            "COMPLETED" => Self::Completed,
            _ => Self::Ongoing,
        })
    }
}

/// A credited author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Display metadata of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub title: String,
    pub summary: String,
    pub status: SeriesStatus,
    pub authors: Vec<Author>,
    pub genres: Vec<String>,
    pub publisher: Option<String>,
    pub release_date: Option<String>,
}

/// A manga series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub name: String,
    pub books_count: u32,
    pub metadata: SeriesMetadata,
    pub cover_image_url: String,
    pub featured: bool,
    pub premium: bool,
    pub average_rating: f64,
    pub rating_count: u32,
}

impl Series {
    /// Title for display, falling back to the series name.
    pub fn title(&self) -> &str {
        if self.metadata.title.trim().is_empty() {
            &self.name
        } else {
            &self.metadata.title
        }
    }

    /// Comma-separated author names.
    pub fn author_names(&self) -> String {
        self.metadata
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A book (chapter) of a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub series_id: String,
    pub name: String,
    /// Sequence number within the series.
    pub number: u32,
    pub pages_count: u32,
}

/// A page of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Page number (1-based).
    pub number: u32,
    pub url: String,
    pub media_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Filter for series listings.
#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    /// Only featured series.
    pub featured: bool,
    /// Only series tagged with this genre (case-insensitive).
    pub genre: Option<String>,
}

impl SeriesFilter {
    pub fn featured() -> Self {
        Self {
            featured: true,
            genre: None,
        }
    }

    fn matches_genre(&self, series: &Series) -> bool {
        match &self.genre {
            Some(genre) => series
                .metadata
                .genres
                .iter()
                .any(|g| g.eq_ignore_ascii_case(genre.trim())),
            None => true,
        }
    }
}

/// A source of catalog data.
///
/// Lookups of unknown ids answer `Ok(None)` or an empty list (a
/// `CatalogError::NotFound` is read the same way); other errors mean the
/// source itself could not answer.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human-readable name for log output.
    fn name(&self) -> &'static str;

    async fn list_series(&self, filter: &SeriesFilter) -> Result<Vec<Series>, CatalogError>;

    async fn get_series(&self, id: &str) -> Result<Option<Series>, CatalogError>;

    /// Books sorted ascending by number.
    async fn list_books(&self, series_id: &str) -> Result<Vec<Book>, CatalogError>;

    async fn get_book(&self, id: &str) -> Result<Option<Book>, CatalogError>;

    async fn list_pages(&self, book_id: &str) -> Result<Vec<Page>, CatalogError>;
}

/// Catalog facade with fixture fallback.
pub struct Catalog {
    remote: Option<Box<dyn CatalogSource>>,
    fixtures: FixtureCatalog,
}

impl Catalog {
    /// Builds the catalog described by `config`.
    ///
    /// An unset endpoint silently selects the fixtures.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        match RemoteCatalog::new(config) {
            Ok(remote) => Ok(Self::with_remote(Box::new(remote))),
            Err(CatalogError::NotConfigured) => Ok(Self::fixtures_only()),
            Err(e) => Err(e),
        }
    }

    pub fn fixtures_only() -> Self {
        Self {
            remote: None,
            fixtures: FixtureCatalog::new(),
        }
    }

    pub fn with_remote(remote: Box<dyn CatalogSource>) -> Self {
        Self {
            remote: Some(remote),
            fixtures: FixtureCatalog::new(),
        }
    }

    /// True when an external source is in use.
    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn list_series(&self, filter: &SeriesFilter) -> Vec<Series> {
        let series = match &self.remote {
            Some(remote) => match remote.list_series(filter).await {
                Ok(series) => series,
                Err(e) => {
                    log_fallback(remote.name(), "list series", &e);
                    self.fixtures.matching(filter)
                }
            },
            None => self.fixtures.matching(filter),
        };
        series
            .into_iter()
            .filter(|s| filter.matches_genre(s))
            .collect()
    }

    pub async fn get_series(&self, id: &str) -> Option<Series> {
        if let Some(remote) = &self.remote {
            match remote.get_series(id).await {
                Ok(series) => return series,
                Err(CatalogError::NotFound(_)) => return None,
                Err(e) => log_fallback(remote.name(), "get series", &e),
            }
        }
        self.fixtures.series(id).cloned()
    }

    pub async fn list_books(&self, series_id: &str) -> Vec<Book> {
        if let Some(remote) = &self.remote {
            match remote.list_books(series_id).await {
                Ok(books) => return books,
                Err(CatalogError::NotFound(_)) => return Vec::new(),
                Err(e) => log_fallback(remote.name(), "list books", &e),
            }
        }
        self.fixtures.books(series_id)
    }

    pub async fn get_book(&self, id: &str) -> Option<Book> {
        if let Some(remote) = &self.remote {
            match remote.get_book(id).await {
                Ok(book) => return book,
                Err(CatalogError::NotFound(_)) => return None,
                Err(e) => log_fallback(remote.name(), "get book", &e),
            }
        }
        self.fixtures.book(id)
    }

    pub async fn list_pages(&self, book_id: &str) -> Vec<Page> {
        if let Some(remote) = &self.remote {
            match remote.list_pages(book_id).await {
                Ok(pages) => return pages,
                Err(CatalogError::NotFound(_)) => return Vec::new(),
                Err(e) => log_fallback(remote.name(), "list pages", &e),
            }
        }
        self.fixtures.pages(book_id)
    }

    /// Every series grouped under each of its genres, genres sorted.
    pub async fn categories(&self) -> BTreeMap<String, Vec<Series>> {
        group_by_genre(self.list_series(&SeriesFilter::default()).await)
    }

    /// Previous and next books of `book` within its series.
    pub async fn neighbours(&self, book: &Book) -> (Option<Book>, Option<Book>) {
        let books = self.list_books(&book.series_id).await;
        let Some(index) = books.iter().position(|b| b.id == book.id) else {
            return (None, None);
        };
        let prev = index.checked_sub(1).and_then(|i| books.get(i)).cloned();
        let next = books.get(index + 1).cloned();
        (prev, next)
    }
}

fn log_fallback(source: &str, operation: &str, error: &CatalogError) {
    tracing::warn!(source, operation, error = %error, "catalog unavailable, using fixtures");
}

/// Groups series by genre. A series appears once under each of its genres.
pub fn group_by_genre(series: Vec<Series>) -> BTreeMap<String, Vec<Series>> {
    let mut categories: BTreeMap<String, Vec<Series>> = BTreeMap::new();
    for s in series {
        for genre in &s.metadata.genres {
            categories.entry(genre.clone()).or_default().push(s.clone());
        }
    }
    categories
}
